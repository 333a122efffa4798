use super::{frac::recalc_rate, read, tree::Source, update_bits, Observers, GPLL_SEL};
use core::hint::spin_loop;
use device::{ErrorKind, Regmap};
use log::{error, trace};
use tock_registers::{register_bitfields, LocalRegisterCopy};

/// Polls of CMD_RCGR.UPDATE before giving up on a configuration switch
const UPDATE_POLLS: usize = 500;

/// Offset of CFG_RCGR from CMD_RCGR
const CFG_RCGR_OFF: u32 = 0x4;

register_bitfields![u32,
    CMD_RCGR [
        /// Latch CFG_RCGR into the mux/divider; cleared by hardware when done
        UPDATE OFFSET(0) NUMBITS(1) [],
        /// CFG_RCGR was written but not yet latched
        DIRTY_CFG OFFSET(4) NUMBITS(1) [],
        /// Root clock is off
        ROOT_OFF OFFSET(31) NUMBITS(1) []
    ],
    CFG_RCGR [
        /// Half-integer divider, `2 * divisor - 1`
        SRC_DIV OFFSET(0) NUMBITS(5) [],
        /// Parent selector
        SRC_SEL OFFSET(8) NUMBITS(3) []
    ]
];

type CmdRcgr = LocalRegisterCopy<u32, CMD_RCGR::Register>;
type CfgRcgr = LocalRegisterCopy<u32, CFG_RCGR::Register>;

/// One entry of a mux parent map: which source sits behind selector `sel`
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Parent {
    pub src: Source,
    pub sel: u32,
}

/// Static description of an RCG mux/divider
#[derive(Debug)]
pub struct MuxDivDesc {
    pub name: &'static str,
    /// Offset of CMD_RCGR; CFG_RCGR follows it
    pub reg_offset: u32,
    /// Branch control register gating the output
    pub enable_reg: u32,
    pub enable_mask: u32,
    pub parent_map: &'static [Parent],
    /// Divider field value programmed on GPLL0 at probe
    pub boot_div: u32,
}

/// A mux/divider output and the configuration software last asked for
///
/// `src` and `div` mirror the hardware only after a successful write through
/// [`MuxDiv::set_src_div_cache`]; the reparent notifier restores them after
/// parking the mux during a PLL change.
#[derive(Debug)]
pub struct MuxDiv {
    desc: &'static MuxDivDesc,
    src: u32,
    div: u32,
    freq: u64,
    pub(crate) nb: Observers,
}

impl MuxDiv {
    pub(crate) fn new(desc: &'static MuxDivDesc) -> Self {
        Self {
            desc,
            src: GPLL_SEL,
            div: 1,
            freq: 0,
            nb: Observers::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.desc.name
    }

    pub fn desc(&self) -> &'static MuxDivDesc {
        self.desc
    }

    /// Cached source selector
    pub fn src(&self) -> u32 {
        self.src
    }

    /// Cached divider field value
    pub fn div(&self) -> u32 {
        self.div
    }

    /// Last rate successfully programmed through the rate interface
    pub fn freq(&self) -> u64 {
        self.freq
    }

    pub(crate) fn set_freq(&mut self, freq: u64) {
        self.freq = freq;
    }

    /// Source behind selector `sel`
    pub fn source_of(&self, sel: u32) -> Option<Source> {
        self.desc
            .parent_map
            .iter()
            .find(|p| p.sel == sel)
            .map(|p| p.src)
    }

    /// Source the cached configuration points at
    pub fn source(&self) -> Option<Source> {
        self.source_of(self.src)
    }

    /// Parent index and selector of `src`
    pub fn find_parent(&self, src: Source) -> Option<(usize, u32)> {
        self.desc
            .parent_map
            .iter()
            .position(|p| p.src == src)
            .map(|i| (i, self.desc.parent_map[i].sel))
    }

    /// Parent index and HFPLL of the first PLL parent
    pub fn pll_parent(&self) -> Option<(usize, Source)> {
        self.desc
            .parent_map
            .iter()
            .position(|p| matches!(p.src, Source::Hfpll(_)))
            .map(|i| (i, self.desc.parent_map[i].src))
    }

    pub fn parent_index(&self, sel: u32) -> Option<usize> {
        self.desc.parent_map.iter().position(|p| p.sel == sel)
    }

    fn cmd_rcgr(&self) -> u32 {
        self.desc.reg_offset
    }

    fn cfg_rcgr(&self) -> u32 {
        self.desc.reg_offset + CFG_RCGR_OFF
    }

    /// Program `src`/`div` and latch it
    ///
    /// Does not touch the cached configuration.
    pub(crate) fn set_src_div<R: Regmap>(
        &self,
        regmap: &mut R,
        src: u32,
        div: u32,
    ) -> Result<(), ErrorKind> {
        let mut cfg = CfgRcgr::new(0);
        cfg.modify(CFG_RCGR::SRC_DIV.val(div) + CFG_RCGR::SRC_SEL.val(src));
        let mask = CFG_RCGR::SRC_DIV.mask << CFG_RCGR::SRC_DIV.shift
            | CFG_RCGR::SRC_SEL.mask << CFG_RCGR::SRC_SEL.shift;

        trace!("{}: src {} div {}", self.name(), src, div);
        update_bits(regmap, self.cfg_rcgr(), mask, cfg.get())?;

        let update = CMD_RCGR::UPDATE.mask << CMD_RCGR::UPDATE.shift;
        update_bits(regmap, self.cmd_rcgr(), update, update)?;

        for _ in 0..UPDATE_POLLS {
            let cmd = CmdRcgr::new(read(regmap, self.cmd_rcgr())?);
            if !cmd.is_set(CMD_RCGR::UPDATE) {
                return Ok(());
            }
            spin_loop();
        }

        error!("{}: rcg didn't update its configuration", self.name());
        Err(ErrorKind::Busy)
    }

    /// Program `src`/`div` and remember them once the hardware took them
    pub(crate) fn set_src_div_cache<R: Regmap>(
        &mut self,
        regmap: &mut R,
        src: u32,
        div: u32,
    ) -> Result<(), ErrorKind> {
        self.set_src_div(regmap, src, div)?;
        self.src = src;
        self.div = div;
        Ok(())
    }

    /// Take `src`/`div` as the configuration to keep, without writing them
    pub(crate) fn adopt(&mut self, src: u32, div: u32, freq: u64) {
        self.src = src;
        self.div = div;
        self.freq = freq;
    }

    /// Read back `(src, div)`
    ///
    /// A divider field of 0 behaves as divide-by-one and is reported as 1.
    /// A configuration that has not been latched yet is not trustworthy; the
    /// cached pair is reported instead.
    pub(crate) fn get_src_div<R: Regmap>(&self, regmap: &mut R) -> Result<(u32, u32), ErrorKind> {
        let cmd = CmdRcgr::new(read(regmap, self.cmd_rcgr())?);
        if cmd.is_set(CMD_RCGR::DIRTY_CFG) {
            error!("{}: RCG configuration is pending", self.name());
            return Ok((self.src, self.div));
        }

        let cfg = CfgRcgr::new(read(regmap, self.cfg_rcgr())?);
        let src = cfg.read(CFG_RCGR::SRC_SEL);
        let div = match cfg.read(CFG_RCGR::SRC_DIV) {
            0 => 1,
            div => div,
        };
        Ok((src, div))
    }

    /// Output rate for `parent_rate` and the cached divider
    pub fn recalc_rate(&self, parent_rate: u64) -> u64 {
        recalc_rate(parent_rate, self.div)
    }

    pub(crate) fn enable<R: Regmap>(&self, regmap: &mut R) -> Result<(), ErrorKind> {
        update_bits(regmap, self.desc.enable_reg, self.desc.enable_mask, self.desc.enable_mask)
    }

    pub(crate) fn disable<R: Regmap>(&self, regmap: &mut R) -> Result<(), ErrorKind> {
        update_bits(regmap, self.desc.enable_reg, self.desc.enable_mask, 0)
    }

    pub(crate) fn is_enabled<R: Regmap>(&self, regmap: &mut R) -> Result<bool, ErrorKind> {
        Ok(read(regmap, self.desc.enable_reg)? & self.desc.enable_mask != 0)
    }

    /// Raw CFG_RCGR write, bypassing the update handshake
    #[cfg(test)]
    pub(crate) fn poke_cfg<R: Regmap>(&self, regmap: &mut R, val: u32) -> Result<(), ErrorKind> {
        super::write(regmap, self.cfg_rcgr(), val)
    }
}
