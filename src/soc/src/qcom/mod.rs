#![allow(non_upper_case_globals)]

pub mod apcc;

pub const KHz: u64 = 1000;
pub const MHz: u64 = 1_000_000;

pub const fn bit(nr: u32) -> u32 {
    1u32 << nr
}

pub const fn genmask(h: u32, l: u32) -> u32 {
    (u32::MAX >> (31 - h)) & (u32::MAX << l)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genmask_covers_inclusive_range() {
        assert_eq!(genmask(9, 8), 0x300);
        assert_eq!(genmask(4, 0), 0x1f);
        assert_eq!(genmask(31, 31), bit(31));
    }
}
