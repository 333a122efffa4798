use crate::{ErrorKind, ErrorType};
use log::trace;

/// Register map
///
/// Word-wide access to a block of 32-bit registers addressed by byte offset
/// from the start of the block. Implementations decide how an offset reaches
/// the hardware (memory mapped I/O, a bus, or a simulation).
pub trait Regmap: ErrorType {
    /// Read the register at `offset`
    fn read(&mut self, offset: u32) -> Result<u32, Self::Error>;

    /// Write `val` to the register at `offset`
    fn write(&mut self, offset: u32, val: u32) -> Result<(), Self::Error>;

    /// Read-modify-write the bits selected by `mask`
    ///
    /// The write is skipped when the masked bits already hold `val`.
    fn update_bits(&mut self, offset: u32, mask: u32, val: u32) -> Result<(), Self::Error> {
        let old = self.read(offset)?;
        let new = (old & !mask) | (val & mask);
        if new != old {
            trace!("regmap: update {offset:#x}: {old:#010x} -> {new:#010x}");
            self.write(offset, new)?;
        }
        Ok(())
    }
}

impl<T: Regmap> Regmap for &mut T {
    fn read(&mut self, offset: u32) -> Result<u32, Self::Error> {
        T::read(self, offset)
    }

    fn write(&mut self, offset: u32, val: u32) -> Result<(), Self::Error> {
        T::write(self, offset, val)
    }

    fn update_bits(&mut self, offset: u32, mask: u32, val: u32) -> Result<(), Self::Error> {
        T::update_bits(self, offset, mask, val)
    }
}

/// Validate that `offset` is a word aligned offset below `max_register`
pub fn check_offset(offset: u32, max_register: u32) -> Result<(), ErrorKind> {
    if offset % 4 != 0 || offset > max_register {
        return Err(ErrorKind::OutOfRange);
    }
    Ok(())
}
