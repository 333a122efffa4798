use super::{read, update_bits, write, Observers};
use bitfield::bitfield;
use core::hint::spin_loop;
use device::{ErrorKind, Regmap};
use log::{debug, error, trace, warn};

/// Polls of MODE.LOCK_DET before declaring the PLL dead
const LOCK_POLLS: usize = 200;

/// Largest value of the L_VAL field
const L_VAL_MAX: u64 = 0xffff;

/// Register offsets, relative to the PLL base
#[derive(Debug)]
pub struct PllRegs {
    pub mode: u32,
    pub l_val: u32,
    pub alpha_val: u32,
    pub user_ctl: u32,
    pub config_ctl: u32,
    pub config_ctl_u: u32,
    pub status: u32,
    pub test_ctl: u32,
    pub test_ctl_u: u32,
}

pub static HFPLL_REGS: PllRegs = PllRegs {
    mode: 0x00,
    l_val: 0x08,
    alpha_val: 0x10,
    user_ctl: 0x18,
    config_ctl: 0x20,
    config_ctl_u: 0x24,
    status: 0x28,
    test_ctl: 0x30,
    test_ctl_u: 0x34,
};

bitfield! {
    #[derive(Clone, Copy)]
    pub struct PllMode(u32);
    impl Debug;
    pub outctrl, set_outctrl: 0;
    pub bypassnl, set_bypassnl: 1;
    pub reset_n, set_reset_n: 2;
    pub lock_det, _: 31;
}

bitfield! {
    #[derive(Clone, Copy)]
    pub struct UserCtl(u32);
    impl Debug;
    pub main_output, set_main_output: 0;
    pub early_output, set_early_output: 3;
    pub u8, post_div, set_post_div: 9, 8;
    pub pre_div, set_pre_div: 12;
    pub alpha_en, set_alpha_en: 24;
}

/// How the PLL realizes fractional rates
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PllFlavor {
    /// L plus a 32-bit alpha fraction of the reference
    Alpha,
    /// Integer multiples of the reference only
    Huayra,
}

impl PllFlavor {
    fn alpha_width(self) -> u32 {
        match self {
            Self::Alpha => 32,
            Self::Huayra => 16,
        }
    }
}

/// Values programmed once before the PLL is first enabled
#[derive(Clone, Copy, Debug, Default)]
pub struct AlphaPllConfig {
    pub l: u32,
    pub config_ctl_val: u32,
    pub config_ctl_hi_val: u32,
    pub test_ctl_val: u32,
    pub test_ctl_hi_val: u32,
    pub main_output_mask: u32,
    pub early_output_mask: u32,
    pub pre_div_val: u32,
    pub pre_div_mask: u32,
    pub post_div_val: u32,
    pub post_div_mask: u32,
}

/// Static description of an HFPLL
#[derive(Debug)]
pub struct AlphaPllDesc {
    pub name: &'static str,
    pub offset: u32,
    pub regs: &'static PllRegs,
    pub flavor: PllFlavor,
    pub config: Option<&'static AlphaPllConfig>,
    /// Rate set and enabled at probe
    pub boot_rate: u64,
}

#[derive(Debug)]
pub struct AlphaPll {
    desc: &'static AlphaPllDesc,
    rate: u64,
    enabled: bool,
    faulted: bool,
    pub(crate) nb: Observers,
}

impl AlphaPll {
    pub(crate) fn new(desc: &'static AlphaPllDesc) -> Self {
        Self {
            desc,
            rate: 0,
            enabled: false,
            faulted: false,
            nb: Observers::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.desc.name
    }

    pub fn desc(&self) -> &'static AlphaPllDesc {
        self.desc
    }

    /// Rate last programmed
    pub fn rate(&self) -> u64 {
        self.rate
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// A failed rate change left the PLL unlocked and it has not been
    /// reprogrammed since
    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    fn reg(&self, off: u32) -> u32 {
        self.desc.offset + off
    }

    fn calc_rate(&self, prate: u64, l: u32, alpha: u32) -> u64 {
        let frac = (prate as u128 * alpha as u128) >> self.desc.flavor.alpha_width();
        prate * l as u64 + frac as u64
    }

    /// Closest rate at or above `rate` the PLL can produce from `prate`
    ///
    /// Returns the rate along with the L and alpha values producing it.
    pub fn round_rate(&self, rate: u64, prate: u64) -> Result<(u64, u32, u32), ErrorKind> {
        if prate == 0 {
            return Err(ErrorKind::OutOfRange);
        }

        let (l, alpha) = match self.desc.flavor {
            PllFlavor::Huayra => (rate.div_ceil(prate), 0u64),
            PllFlavor::Alpha => {
                let width = self.desc.flavor.alpha_width();
                let rem = (rate % prate) as u128;
                let alpha = ((rem << width) + prate as u128 - 1) / prate as u128;
                if alpha >> width != 0 {
                    (rate / prate + 1, 0)
                } else {
                    (rate / prate, alpha as u64)
                }
            }
        };

        if l == 0 || l > L_VAL_MAX {
            return Err(ErrorKind::OutOfRange);
        }

        let (l, alpha) = (l as u32, alpha as u32);
        Ok((self.calc_rate(prate, l, alpha), l, alpha))
    }

    /// Program the static control values
    pub(crate) fn configure<R: Regmap>(
        &self,
        regmap: &mut R,
        config: &AlphaPllConfig,
    ) -> Result<(), ErrorKind> {
        let regs = self.desc.regs;
        debug!("{}: configure", self.name());

        if config.l != 0 {
            write(regmap, self.reg(regs.l_val), config.l)?;
        }
        write(regmap, self.reg(regs.config_ctl), config.config_ctl_val)?;
        if config.config_ctl_hi_val != 0 {
            write(regmap, self.reg(regs.config_ctl_u), config.config_ctl_hi_val)?;
        }
        if config.test_ctl_val != 0 {
            write(regmap, self.reg(regs.test_ctl), config.test_ctl_val)?;
        }
        if config.test_ctl_hi_val != 0 {
            write(regmap, self.reg(regs.test_ctl_u), config.test_ctl_hi_val)?;
        }

        let mask = config.main_output_mask
            | config.early_output_mask
            | config.pre_div_mask
            | config.post_div_mask;
        let val = config.main_output_mask
            | config.early_output_mask
            | config.pre_div_val
            | config.post_div_val;
        update_bits(regmap, self.reg(regs.user_ctl), mask, val)
    }

    fn mode<R: Regmap>(&self, regmap: &mut R) -> Result<PllMode, ErrorKind> {
        Ok(PllMode(read(regmap, self.reg(self.desc.regs.mode))?))
    }

    fn wait_for_lock<R: Regmap>(&self, regmap: &mut R) -> Result<(), ErrorKind> {
        for _ in 0..LOCK_POLLS {
            if self.mode(regmap)?.lock_det() {
                return Ok(());
            }
            spin_loop();
        }
        error!("{}: pll failed to lock", self.name());
        Err(ErrorKind::Timeout)
    }

    fn write_l_alpha<R: Regmap>(&self, regmap: &mut R, l: u32, alpha: u32) -> Result<(), ErrorKind> {
        let regs = self.desc.regs;
        write(regmap, self.reg(regs.l_val), l)?;
        write(regmap, self.reg(regs.alpha_val), alpha)?;
        if self.desc.flavor == PllFlavor::Alpha {
            let mut en = UserCtl(0);
            en.set_alpha_en(true);
            update_bits(regmap, self.reg(regs.user_ctl), en.0, en.0)?;
        }

        if self.enabled {
            self.wait_for_lock(regmap)?;
        }
        Ok(())
    }

    /// Program L/alpha; waits for relock when running
    ///
    /// When the new values cannot be written or the PLL does not relock, the
    /// previous L/alpha are written back. If the PLL does not lock on those
    /// either it is marked faulted. In every case [`AlphaPll::rate`] ends up
    /// describing what the registers hold.
    ///
    /// Callers notify observers around this; see `ClockTree::set_pll_rate`.
    pub(crate) fn program_rate<R: Regmap>(
        &mut self,
        regmap: &mut R,
        rate: u64,
        prate: u64,
    ) -> Result<u64, ErrorKind> {
        let (rounded, l, alpha) = self.round_rate(rate, prate)?;
        let regs = self.desc.regs;
        let prev_l = read(regmap, self.reg(regs.l_val))?;
        let prev_alpha = read(regmap, self.reg(regs.alpha_val))?;

        trace!("{}: l {} alpha {:#x}", self.name(), l, alpha);
        let Err(e) = self.write_l_alpha(regmap, l, alpha) else {
            self.rate = rounded;
            self.faulted = false;
            return Ok(rounded);
        };

        warn!("{}: back to l {} alpha {:#x}", self.name(), prev_l, prev_alpha);
        if let Err(restore) = self.write_l_alpha(regmap, prev_l, prev_alpha) {
            error!("{}: previous rate did not come back: {}", self.name(), restore);
            self.faulted = true;
        }
        if let Ok(actual) = self.recalc_rate(regmap, prate) {
            self.rate = actual;
        }
        Err(e)
    }

    pub(crate) fn enable<R: Regmap>(&mut self, regmap: &mut R) -> Result<(), ErrorKind> {
        let off = self.reg(self.desc.regs.mode);

        let mut mode = self.mode(regmap)?;
        mode.set_bypassnl(true);
        write(regmap, off, mode.0)?;
        mode.set_reset_n(true);
        write(regmap, off, mode.0)?;

        self.wait_for_lock(regmap)?;

        let mut mode = self.mode(regmap)?;
        mode.set_outctrl(true);
        write(regmap, off, mode.0)?;

        debug!("{}: enabled at {} Hz", self.name(), self.rate);
        self.enabled = true;
        self.faulted = false;
        Ok(())
    }

    pub(crate) fn disable<R: Regmap>(&mut self, regmap: &mut R) -> Result<(), ErrorKind> {
        let off = self.reg(self.desc.regs.mode);

        let mut mode = self.mode(regmap)?;
        mode.set_outctrl(false);
        write(regmap, off, mode.0)?;
        mode.set_bypassnl(false);
        mode.set_reset_n(false);
        write(regmap, off, mode.0)?;

        self.enabled = false;
        Ok(())
    }

    /// Rate the L/alpha registers currently describe
    pub fn recalc_rate<R: Regmap>(&self, regmap: &mut R, prate: u64) -> Result<u64, ErrorKind> {
        let regs = self.desc.regs;
        let l = read(regmap, self.reg(regs.l_val))? & L_VAL_MAX as u32;
        let mut alpha = read(regmap, self.reg(regs.alpha_val))?;
        if self.desc.flavor == PllFlavor::Huayra {
            alpha &= 0xffff;
        }
        Ok(self.calc_rate(prate, l, alpha))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qcom::apcc::{SimRegmap, Variant, XO_HZ};

    static ALPHA: AlphaPllDesc = AlphaPllDesc {
        name: "test-alpha",
        offset: 0x105000,
        regs: &HFPLL_REGS,
        flavor: PllFlavor::Alpha,
        config: None,
        boot_rate: 0,
    };

    static HUAYRA: AlphaPllDesc = AlphaPllDesc {
        name: "test-huayra",
        offset: 0x105000,
        regs: &HFPLL_REGS,
        flavor: PllFlavor::Huayra,
        config: None,
        boot_rate: 0,
    };

    #[test]
    fn alpha_rounding_is_exact_for_whole_hz() {
        let pll = AlphaPll::new(&ALPHA);
        let (rate, l, alpha) = pll.round_rate(1_200_000_000, XO_HZ).unwrap();
        assert_eq!(rate, 1_200_000_000);
        assert_eq!(l, 62);
        assert_eq!(alpha, 1 << 31);

        for r in [614_400_000u64, 900_000_000, 1_000_000_001, 1_999_999_999] {
            assert_eq!(pll.round_rate(r, XO_HZ).unwrap().0, r);
        }
    }

    #[test]
    fn huayra_rounds_up_to_reference_multiple() {
        let pll = AlphaPll::new(&HUAYRA);
        assert_eq!(pll.round_rate(806_400_000, XO_HZ).unwrap(), (806_400_000, 42, 0));
        assert_eq!(pll.round_rate(1_200_000_000, XO_HZ).unwrap().0, 1_209_600_000);
    }

    #[test]
    fn rates_needing_no_multiplier_are_out_of_range() {
        let pll = AlphaPll::new(&HUAYRA);
        assert_eq!(pll.round_rate(0, XO_HZ), Err(ErrorKind::OutOfRange));
        assert_eq!(pll.round_rate(XO_HZ * 0x10000, XO_HZ), Err(ErrorKind::OutOfRange));
    }

    #[test]
    fn enable_waits_for_lock() {
        let mut regmap = SimRegmap::for_variant(Variant::ApcsMsm8953);
        let mut pll = AlphaPll::new(&ALPHA);
        pll.enable(&mut regmap).unwrap();
        let mode = PllMode(regmap.peek(0x105000));
        assert!(mode.outctrl() && mode.bypassnl() && mode.reset_n() && mode.lock_det());

        pll.disable(&mut regmap).unwrap();
        assert!(!PllMode(regmap.peek(0x105000)).outctrl());
    }

    #[test]
    fn enable_times_out_without_lock() {
        let mut regmap = SimRegmap::for_variant(Variant::ApcsMsm8953);
        regmap.set_never_lock(true);
        let mut pll = AlphaPll::new(&ALPHA);
        assert_eq!(pll.enable(&mut regmap), Err(ErrorKind::Timeout));
        assert!(!pll.is_enabled());
    }

    #[test]
    fn programmed_rate_reads_back() {
        let mut regmap = SimRegmap::for_variant(Variant::ApcsMsm8953);
        let mut pll = AlphaPll::new(&ALPHA);
        pll.program_rate(&mut regmap, 1_200_000_000, XO_HZ).unwrap();
        assert_eq!(pll.rate(), 1_200_000_000);
        assert_eq!(pll.recalc_rate(&mut regmap, XO_HZ).unwrap(), 1_200_000_000);
        assert!(UserCtl(regmap.peek(0x105018)).alpha_en());
    }

    #[test]
    fn missed_lock_puts_previous_values_back() {
        let mut regmap = SimRegmap::for_variant(Variant::ApcsMsm8953);
        let mut pll = AlphaPll::new(&ALPHA);
        pll.program_rate(&mut regmap, 1_200_000_000, XO_HZ).unwrap();
        pll.enable(&mut regmap).unwrap();

        regmap.set_lock_misses(LOCK_POLLS);
        assert_eq!(pll.program_rate(&mut regmap, 1_536_000_000, XO_HZ), Err(ErrorKind::Timeout));
        assert!(!pll.is_faulted());
        assert_eq!(pll.rate(), 1_200_000_000);
        assert_eq!(pll.recalc_rate(&mut regmap, XO_HZ).unwrap(), 1_200_000_000);
    }

    #[test]
    fn no_lock_at_all_marks_the_pll_faulted() {
        let mut regmap = SimRegmap::for_variant(Variant::ApcsMsm8953);
        let mut pll = AlphaPll::new(&ALPHA);
        pll.program_rate(&mut regmap, 1_200_000_000, XO_HZ).unwrap();
        pll.enable(&mut regmap).unwrap();

        regmap.fail_writes_to(Some(0x105010));
        assert_eq!(pll.program_rate(&mut regmap, 1_536_000_000, XO_HZ), Err(ErrorKind::Io));
        assert!(pll.is_faulted());
        assert_eq!(pll.rate(), pll.recalc_rate(&mut regmap, XO_HZ).unwrap());

        regmap.fail_writes_to(None);
        pll.program_rate(&mut regmap, 1_536_000_000, XO_HZ).unwrap();
        assert!(!pll.is_faulted());
        assert_eq!(pll.rate(), 1_536_000_000);
    }

    #[test]
    fn configure_sets_output_fields() {
        static CFG: AlphaPllConfig = AlphaPllConfig {
            l: 0,
            config_ctl_val: 0x200d4828,
            config_ctl_hi_val: 0x6,
            test_ctl_val: 0x1c000000,
            test_ctl_hi_val: 0x4000,
            main_output_mask: 1 << 0,
            early_output_mask: 1 << 3,
            pre_div_val: 0,
            pre_div_mask: 1 << 12,
            post_div_val: 1 << 8,
            post_div_mask: 0x300,
        };
        let mut regmap = SimRegmap::for_variant(Variant::ApcsMsm8953);
        let pll = AlphaPll::new(&ALPHA);
        pll.configure(&mut regmap, &CFG).unwrap();
        assert_eq!(regmap.peek(0x105020), 0x200d4828);
        assert_eq!(regmap.peek(0x105034), 0x4000);
        let user = UserCtl(regmap.peek(0x105018));
        assert!(user.main_output() && user.early_output() && !user.pre_div());
        assert_eq!(user.post_div(), 1);
    }
}
