#[cfg(not(windows))]
mod fuzz {
    use bootpatcher::format::bootimage::BootImage;
    use honggfuzz::fuzz;

    pub fn main() {
        loop {
            fuzz!(|data: &[u8]| {
                if let Ok(image) = BootImage::load(data) {
                    let _ = image.compute_id();
                    let _ = image.create();
                }
            });
        }
    }
}

fn main() {
    #[cfg(not(windows))]
    fuzz::main();
}
