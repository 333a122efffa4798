use device::{check_offset, ErrorKind, ErrorType, Regmap};

/// Memory mapped APCC register block
#[derive(Debug)]
pub struct MmioRegmap {
    base: usize,
    max_register: u32,
}

impl MmioRegmap {
    /// # Safety
    ///
    /// `base` must map `max_register + 4` bytes of device memory that nothing
    /// else accesses for the lifetime of the regmap.
    pub unsafe fn new(base: usize, max_register: u32) -> Self {
        Self { base, max_register }
    }

    pub fn base(&self) -> usize {
        self.base
    }
}

impl ErrorType for MmioRegmap {
    type Error = ErrorKind;
}

impl Regmap for MmioRegmap {
    fn read(&mut self, offset: u32) -> Result<u32, ErrorKind> {
        check_offset(offset, self.max_register)?;
        // SAFETY: in bounds and aligned, the mapping is guaranteed by new()
        Ok(unsafe { asm::readl(self.base + offset as usize) })
    }

    fn write(&mut self, offset: u32, val: u32) -> Result<(), ErrorKind> {
        check_offset(offset, self.max_register)?;
        // SAFETY: as above
        unsafe { asm::writel(val, self.base + offset as usize) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accesses_stay_inside_the_block() {
        let mut block = [0u32; 4];
        let mut regmap = unsafe { MmioRegmap::new(block.as_mut_ptr() as usize, 12) };

        regmap.update_bits(4, 0xf0, 0x50).unwrap();
        assert_eq!(regmap.read(4), Ok(0x50));
        assert_eq!(regmap.read(16), Err(ErrorKind::OutOfRange));
        assert_eq!(regmap.write(2, 1), Err(ErrorKind::OutOfRange));
        assert_eq!(u32::from_le(block[1]), 0x50);
    }
}
