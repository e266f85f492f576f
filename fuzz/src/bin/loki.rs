#[cfg(not(windows))]
mod fuzz {
    use bootpatcher::patch::loki;
    use honggfuzz::fuzz;

    pub fn main() {
        loop {
            fuzz!(|data: &[u8]| {
                // The first half is the boot image and the second half is aboot.
                let (image, aboot) = data.split_at(data.len() / 2);
                let _ = loki::patch(image, aboot);
            });
        }
    }
}

fn main() {
    #[cfg(not(windows))]
    fuzz::main();
}
