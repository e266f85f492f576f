// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Known aboot builds with an exploitable signature check. The table must match
//! the bootloaders found on real devices exactly, so entries are only ever
//! looked up by their signature check address.

use serde::Serialize;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Target {
    pub vendor: &'static str,
    pub device: &'static str,
    pub build: &'static str,
    /// Virtual address of the signature check routine.
    pub check_sigs: u32,
    /// Virtual address of the boot image header copy in aboot's memory.
    pub hdr: u32,
    /// LG bootloaders load a full page for the fake ramdisk.
    pub lg: bool,
}

const fn target(
    vendor: &'static str,
    device: &'static str,
    build: &'static str,
    check_sigs: u32,
    hdr: u32,
    lg: bool,
) -> Target {
    Target {
        vendor,
        device,
        build,
        check_sigs,
        hdr,
        lg,
    }
}

#[rustfmt::skip]
pub static TARGETS: &[Target] = &[
    target("AT&T", "Samsung Galaxy S4", "JDQ39.I337UCUAMDB or JDQ39.I337UCUAMDL", 0x88e0ff98, 0x88f3bafc, false),
    target("Verizon", "Samsung Galaxy S4", "JDQ39.I545VRUAMDK", 0x88e0fe98, 0x88f372fc, false),
    target("DoCoMo", "Samsung Galaxy S4", "JDQ39.SC04EOMUAMDI", 0x88e0fcd8, 0x88f0b2fc, false),
    target("Verizon", "Samsung Galaxy Stellar", "IMM76D.I200VRALH2", 0x88e0f5c0, 0x88ed32e0, false),
    target("Verizon", "Samsung Galaxy Stellar", "JZO54K.I200VRBMA1", 0x88e101ac, 0x88ed72e0, false),
    target("T-Mobile", "LG Optimus F3Q", "D52010c", 0x88f1079c, 0x88f64508, true),
    target("DoCoMo", "LG Optimus G", "L01E20b", 0x88f10e48, 0x88f54418, true),
    target("DoCoMo", "LG Optimus it L05E", "L05E10d", 0x88f1157c, 0x88f31e10, true),
    target("DoCoMo", "LG Optimus G Pro", "L04E10f", 0x88f1102c, 0x88f54418, true),
    target("AT&T or HK", "LG Optimus G Pro", "E98010g or E98810b", 0x88f11084, 0x88f54418, true),
    target("KT, LGU, or SKT", "LG Optimus G Pro", "F240K10o, F240L10v, or F240S10w", 0x88f110b8, 0x88f54418, true),
    target("KT, LGU, or SKT", "LG Optimus LTE 2", "F160K20g, F160L20f, F160LV20d, or F160S20f", 0x88f10864, 0x88f802b8, true),
    target("MetroPCS", "LG Spirit", "MS87010a_05", 0x88f0e634, 0x88f68194, true),
    target("MetroPCS", "LG Motion", "MS77010f_01", 0x88f1015c, 0x88f58194, true),
    target("Verizon", "LG Lucid 2", "VS87010B_12", 0x88f10adc, 0x88f702bc, true),
    target("Verizon", "LG Spectrum 2", "VS93021B_05", 0x88f10c58, 0x88f84518, true),
    target("Boost Mobile", "LG Optimus F7", "LG870ZV4_06", 0x88f11714, 0x88f842ac, true),
    target("US Cellular", "LG Optimus F7", "US78011a", 0x88f112c8, 0x88f84518, true),
    target("Sprint", "LG Optimus F7", "LG870ZV5_02", 0x88f11710, 0x88f842a8, true),
    target("Virgin Mobile", "LG Optimus F3", "LS720ZV5", 0x88f108f0, 0x88f854f4, true),
    target("T-Mobile and MetroPCS", "LG Optimus F3", "LS720ZV5", 0x88f10264, 0x88f64508, true),
    target("AT&T", "LG G2", "D80010d", 0xf8132ac, 0xf906440, true),
    target("Verizon", "LG G2", "VS98010b", 0xf8131f0, 0xf906440, true),
    target("AT&T", "LG G2", "D80010o", 0xf813428, 0xf904400, true),
    target("Verizon", "LG G2", "VS98012b", 0xf813210, 0xf906440, true),
    target("T-Mobile or Canada", "LG G2", "D80110c or D803", 0xf813294, 0xf906440, true),
    target("International", "LG G2", "D802b", 0xf813a70, 0xf9041c0, true),
    target("Sprint", "LG G2", "LS980ZV7", 0xf813460, 0xf9041c0, true),
    target("KT or LGU", "LG G2", "F320K, F320L", 0xf81346c, 0xf8de440, true),
    target("SKT", "LG G2", "F320S", 0xf8132e4, 0xf8ee440, true),
    target("SKT", "LG G2", "F320S11c", 0xf813470, 0xf8de440, true),
    target("DoCoMo", "LG G2", "L-01F", 0xf813538, 0xf8d41c0, true),
    target("KT", "LG G Flex", "F340K", 0xf8124a4, 0xf8b6440, true),
    target("KDDI", "LG G Flex", "LGL2310d", 0xf81261c, 0xf8b41c0, true),
    target("International", "LG Optimus F5", "P87510e", 0x88f10a9c, 0x88f702b8, true),
    target("SKT", "LG Optimus LTE 3", "F260S10l", 0x88f11398, 0x88f8451c, true),
    target("International", "LG G Pad 8.3", "V50010a", 0x88f10814, 0x88f801b8, true),
    target("International", "LG G Pad 8.3", "V50010c or V50010e", 0x88f108bc, 0x88f801b8, true),
    target("Verizon", "LG G Pad 8.3", "VK81010c", 0x88f11080, 0x88fd81b8, true),
    target("International", "LG Optimus L9 II", "D60510a", 0x88f10d98, 0x88f84aa4, true),
    target("MetroPCS", "LG Optimus F6", "MS50010e", 0x88f10260, 0x88f70508, true),
    target("Open EU", "LG Optimus F6", "D50510a", 0x88f10284, 0x88f70aa4, true),
    target("KDDI", "LG Isai", "LGL22", 0xf813458, 0xf8d41c0, true),
    target("KDDI", "LG", "LGL21", 0x88f10218, 0x88f50198, true),
    target("KT", "LG Optimus GK", "F220K", 0x88f11034, 0x88f54418, true),
    target("International", "LG Vu 3", "F300L", 0xf813170, 0xf8d2440, true),
    target("Sprint", "LG Viper", "LS840ZVK", 0x4010fe18, 0x40194198, true),
    target("International", "LG G Flex", "D95510a", 0xf812490, 0xf8c2440, true),
    target("Sprint", "LG Mach", "LS860ZV7", 0x88f102b4, 0x88f6c194, true),
];

/// Find the target whose signature check routine lives at exactly
/// `check_sigs`.
pub fn find_by_check_sigs(check_sigs: u32) -> Option<&'static Target> {
    TARGETS.iter().find(|t| t.check_sigs == check_sigs)
}
