//! Register file standing in for the APCC block on the host.
//!
//! Registers read as zero until written. CMD_RCGR.UPDATE self-clears on every
//! mux/divider and MODE.LOCK_DET follows MODE.RESET_N on every HFPLL, so the
//! drivers' polling loops terminate. Both behaviors can be broken on purpose
//! to exercise the error paths.
//!
//! The write log keeps the first 256 writes since it was last cleared;
//! [`SimRegmap::log_overflowed`] tells whether any were dropped.

use super::Variant;
use device::{check_offset, ErrorKind, ErrorType, Regmap};
use heapless::{FnvIndexMap, Vec};
use log::{trace, warn};

const MAX_REGS: usize = 64;
const MAX_LOG: usize = 256;

const CMD_UPDATE: u32 = 1 << 0;
const MODE_RESET_N: u32 = 1 << 2;
const MODE_LOCK_DET: u32 = 1 << 31;

#[derive(Debug, Default)]
pub struct SimRegmap {
    regs: FnvIndexMap<u32, u32, MAX_REGS>,
    log: Vec<(u32, u32), MAX_LOG>,
    cmd_regs: Vec<u32, 4>,
    mode_regs: Vec<u32, 4>,
    max_register: u32,
    overflowed: bool,
    /// Offset to fail writes to, after letting this many through
    fail_at: Option<(u32, usize)>,
    update_stuck: bool,
    never_lock: bool,
    lock_misses: usize,
}

impl SimRegmap {
    /// Empty register file accepting offsets up to `max_register`
    pub fn new(max_register: u32) -> Self {
        Self {
            max_register,
            ..Default::default()
        }
    }

    /// Register file with the hardware handshakes of `variant` wired up
    pub fn for_variant(variant: Variant) -> Self {
        let desc = variant.desc();
        let mut sim = Self::new(desc.max_register);
        for md in desc.muxes {
            let _ = sim.cmd_regs.push(md.reg_offset);
        }
        for pll in desc.plls {
            let _ = sim.mode_regs.push(pll.offset + pll.regs.mode);
        }
        sim
    }

    /// Register contents, bypassing the access log
    pub fn peek(&self, offset: u32) -> u32 {
        self.regs.get(&offset).copied().unwrap_or(0)
    }

    /// Set a register without side effects or logging
    pub fn poke(&mut self, offset: u32, val: u32) -> Result<(), ErrorKind> {
        self.regs.insert(offset, val).map_err(|_| ErrorKind::OutOfRange)?;
        Ok(())
    }

    /// Make every write to `offset` fail with [`ErrorKind::Io`]
    pub fn fail_writes_to(&mut self, offset: Option<u32>) {
        self.fail_at = offset.map(|off| (off, 0));
    }

    /// Let `n` more writes to `offset` through, then fail the rest
    pub fn fail_writes_to_after(&mut self, offset: u32, n: usize) {
        self.fail_at = Some((offset, n));
    }

    /// Keep CMD_RCGR.UPDATE set once written
    pub fn set_update_stuck(&mut self, stuck: bool) {
        self.update_stuck = stuck;
    }

    /// Report MODE.LOCK_DET clear whatever RESET_N says
    pub fn set_never_lock(&mut self, never: bool) {
        self.never_lock = never;
    }

    /// Report MODE.LOCK_DET clear for the next `n` MODE reads
    pub fn set_lock_misses(&mut self, n: usize) {
        self.lock_misses = n;
    }

    /// Writes seen so far, oldest first
    pub fn log(&self) -> &[(u32, u32)] {
        &self.log
    }

    /// Writes were dropped from the log since it was last cleared
    pub fn log_overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
        self.overflowed = false;
    }

    fn latch(&self, offset: u32, mut val: u32) -> u32 {
        if self.cmd_regs.contains(&offset) && !self.update_stuck {
            val &= !CMD_UPDATE;
        }
        if self.mode_regs.contains(&offset) {
            if val & MODE_RESET_N != 0 {
                val |= MODE_LOCK_DET;
            } else {
                val &= !MODE_LOCK_DET;
            }
        }
        val
    }
}

impl ErrorType for SimRegmap {
    type Error = ErrorKind;
}

impl Regmap for SimRegmap {
    fn read(&mut self, offset: u32) -> Result<u32, ErrorKind> {
        check_offset(offset, self.max_register)?;
        let val = self.peek(offset);
        if !self.mode_regs.contains(&offset) {
            return Ok(val);
        }
        if self.lock_misses > 0 {
            self.lock_misses -= 1;
            return Ok(val & !MODE_LOCK_DET);
        }
        if self.never_lock {
            return Ok(val & !MODE_LOCK_DET);
        }
        Ok(val)
    }

    fn write(&mut self, offset: u32, val: u32) -> Result<(), ErrorKind> {
        check_offset(offset, self.max_register)?;
        if let Some((off, left)) = &mut self.fail_at {
            if *off == offset {
                if *left == 0 {
                    return Err(ErrorKind::Io);
                }
                *left -= 1;
            }
        }

        trace!("sim: {offset:#x} <- {val:#010x}");
        if self.log.push((offset, val)).is_err() && !self.overflowed {
            warn!("sim: write log full, dropping writes");
            self.overflowed = true;
        }
        let val = self.latch(offset, val);
        self.regs.insert(offset, val).map_err(|_| ErrorKind::OutOfRange)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_self_clears() {
        let mut sim = SimRegmap::for_variant(Variant::Msm8953);
        sim.write(0x1c0050, 1).unwrap();
        assert_eq!(sim.peek(0x1c0050), 0);

        sim.set_update_stuck(true);
        sim.write(0x1c0050, 1).unwrap();
        assert_eq!(sim.peek(0x1c0050), 1);
    }

    #[test]
    fn lock_follows_reset() {
        let mut sim = SimRegmap::for_variant(Variant::Sdm632);
        sim.write(0x005000, MODE_RESET_N).unwrap();
        assert_eq!(sim.peek(0x005000), MODE_RESET_N | MODE_LOCK_DET);
        sim.set_never_lock(true);
        assert_eq!(sim.read(0x005000), Ok(MODE_RESET_N));
        sim.write(0x005000, 0).unwrap();
        assert_eq!(sim.peek(0x005000), 0);
    }

    #[test]
    fn writes_are_logged_and_checked() {
        let mut sim = SimRegmap::new(0x100);
        sim.write(0x10, 7).unwrap();
        sim.poke(0x14, 9).unwrap();
        assert_eq!(sim.log(), &[(0x10, 7)]);
        assert_eq!(sim.read(0x14), Ok(9));
        assert_eq!(sim.read(0x13), Err(ErrorKind::OutOfRange));
        assert_eq!(sim.write(0x104, 0), Err(ErrorKind::OutOfRange));

        sim.fail_writes_to(Some(0x10));
        assert_eq!(sim.write(0x10, 1), Err(ErrorKind::Io));
        assert_eq!(sim.peek(0x10), 7);
        sim.clear_log();
        assert!(sim.log().is_empty());
    }

    #[test]
    fn lock_misses_run_out() {
        let mut sim = SimRegmap::for_variant(Variant::Sdm632);
        sim.write(0x005000, MODE_RESET_N).unwrap();
        sim.set_lock_misses(2);
        assert_eq!(sim.read(0x005000), Ok(MODE_RESET_N));
        assert_eq!(sim.read(0x005000), Ok(MODE_RESET_N));
        assert_eq!(sim.read(0x005000), Ok(MODE_RESET_N | MODE_LOCK_DET));
    }

    #[test]
    fn delayed_write_failure() {
        let mut sim = SimRegmap::new(0x100);
        sim.fail_writes_to_after(0x10, 1);
        sim.write(0x10, 1).unwrap();
        assert_eq!(sim.write(0x10, 2), Err(ErrorKind::Io));
        sim.write(0x14, 3).unwrap();
        assert_eq!(sim.peek(0x10), 1);
    }

    #[test]
    fn full_register_file_is_reported() {
        let mut sim = SimRegmap::new(0x1000);
        for i in 0..MAX_REGS as u32 {
            sim.poke(i * 4, i).unwrap();
        }
        assert_eq!(sim.poke(0x800, 1), Err(ErrorKind::OutOfRange));
    }

    #[test]
    fn log_overflow_is_flagged() {
        let mut sim = SimRegmap::new(0x100);
        for i in 0..MAX_LOG as u32 {
            sim.write(0x10, i).unwrap();
        }
        assert!(!sim.log_overflowed());
        sim.write(0x10, 0).unwrap();
        assert!(sim.log_overflowed());
        assert_eq!(sim.log().len(), MAX_LOG);
        sim.clear_log();
        assert!(!sim.log_overflowed());
    }
}
