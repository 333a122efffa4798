use super::{
    alpha_pll::{AlphaPllConfig, AlphaPllDesc, PllFlavor, HFPLL_REGS},
    frac::recalc_rate,
    mux_div::{MuxDivDesc, Parent},
    tree::ClkRef,
    ClockTree, MuxId, Observer, PllId, Source, APCC_CLK_C0, APCC_CLK_C1, APCC_CLK_CCI, APCC_CLK_HFPLL_C0,
    APCC_CLK_HFPLL_C1, GPLL_SEL, HFPLL_SEL,
};
use crate::qcom::{bit, genmask, KHz};
use device::{ErrorKind, Regmap};
use log::{debug, info};

/// Supported controllers
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Variant {
    /// Two clusters sharing one alpha PLL
    ApcsMsm8953,
    /// Two clusters and the CCI sharing one Huayra PLL
    Msm8953,
    /// One Huayra PLL per cluster; the CCI runs from GPLL0 only
    Sdm632,
}

/// Clock topology of a controller
#[derive(Debug)]
pub struct TreeDesc {
    pub muxes: &'static [MuxDivDesc],
    pub plls: &'static [AlphaPllDesc],
    /// CCI mux and the cluster muxes it follows
    pub cci: Option<(MuxId, [MuxId; 2])>,
    pub max_register: u32,
}

const OF_MATCH: [(&str, Variant); 3] = [
    ("qcom,apcs-msm8953", Variant::ApcsMsm8953),
    ("qcom,msm8953-apcc", Variant::Msm8953),
    ("qcom,sdm632-apcc", Variant::Sdm632),
];

impl Variant {
    pub fn from_compatible(compatible: &str) -> Result<Self, ErrorKind> {
        OF_MATCH
            .iter()
            .find(|(c, _)| *c == compatible)
            .map(|(_, v)| *v)
            .ok_or(ErrorKind::Unimplemented)
    }

    pub fn compatible(&self) -> &'static str {
        OF_MATCH
            .iter()
            .find(|(_, v)| v == self)
            .map(|(c, _)| *c)
            .unwrap_or("")
    }

    pub fn desc(&self) -> &'static TreeDesc {
        match self {
            Self::ApcsMsm8953 => &APCS_MSM8953,
            Self::Msm8953 => &APCC_MSM8953,
            Self::Sdm632 => &APCC_SDM632,
        }
    }
}

static C0_C1_CCI_PARENTS: [Parent; 2] = [
    Parent { src: Source::Gpll, sel: GPLL_SEL },
    Parent { src: Source::Hfpll(APCC_CLK_HFPLL_C0), sel: HFPLL_SEL },
];

static SDM632_C1_PARENTS: [Parent; 2] = [
    Parent { src: Source::Gpll, sel: GPLL_SEL },
    Parent { src: Source::Hfpll(APCC_CLK_HFPLL_C1), sel: HFPLL_SEL },
];

// The CCI HFPLL needs dynamic programming the driver does not do
static SDM632_CCI_PARENTS: [Parent; 1] = [Parent { src: Source::Gpll, sel: GPLL_SEL }];

static MSM8953_PLL_CONFIG: AlphaPllConfig = AlphaPllConfig {
    l: 0,
    config_ctl_val: 0x200d4828,
    config_ctl_hi_val: 0x6,
    test_ctl_val: 0x1c000000,
    test_ctl_hi_val: 0x4000,
    main_output_mask: bit(0),
    early_output_mask: bit(3),
    pre_div_val: 0,
    pre_div_mask: bit(12),
    post_div_val: bit(8),
    post_div_mask: genmask(9, 8),
};

static SDM632_PLL_CONFIG: AlphaPllConfig = AlphaPllConfig {
    l: 0,
    config_ctl_val: 0x200d4828,
    config_ctl_hi_val: 0x6,
    test_ctl_val: 0x1c000000,
    test_ctl_hi_val: 0x4000,
    main_output_mask: bit(0),
    early_output_mask: bit(3),
    pre_div_val: 0,
    pre_div_mask: 0,
    post_div_val: 0,
    post_div_mask: 0,
};

static SDM632_CCI_PLL_CONFIG: AlphaPllConfig = AlphaPllConfig {
    l: 0,
    config_ctl_val: 0x4001055b,
    config_ctl_hi_val: 0,
    test_ctl_val: 0,
    test_ctl_hi_val: 0,
    main_output_mask: 0,
    early_output_mask: bit(3),
    pre_div_val: 0,
    pre_div_mask: 0,
    post_div_val: 0,
    post_div_mask: 0,
};

static APCS_MSM8953: TreeDesc = TreeDesc {
    muxes: &[
        MuxDivDesc {
            name: "apcs-c0-clk",
            reg_offset: 0x100050,
            enable_reg: 0x100058,
            enable_mask: bit(0),
            parent_map: &C0_C1_CCI_PARENTS,
            boot_div: 1,
        },
        MuxDivDesc {
            name: "apcs-c1-clk",
            reg_offset: 0x000050,
            enable_reg: 0x000058,
            enable_mask: bit(0),
            parent_map: &C0_C1_CCI_PARENTS,
            boot_div: 1,
        },
    ],
    plls: &[AlphaPllDesc {
        name: "apcs-hfpll",
        offset: 0x105000,
        regs: &HFPLL_REGS,
        flavor: PllFlavor::Alpha,
        config: Some(&MSM8953_PLL_CONFIG),
        boot_rate: 614_400 * KHz,
    }],
    cci: None,
    max_register: 0x1c0100,
};

static APCC_MSM8953: TreeDesc = TreeDesc {
    muxes: &[
        MuxDivDesc {
            name: "apcc-c0-clk",
            reg_offset: 0x100050,
            enable_reg: 0x100058,
            enable_mask: bit(0),
            parent_map: &C0_C1_CCI_PARENTS,
            boot_div: 2,
        },
        MuxDivDesc {
            name: "apcc-c1-clk",
            reg_offset: 0x000050,
            enable_reg: 0x000058,
            enable_mask: bit(0),
            parent_map: &C0_C1_CCI_PARENTS,
            boot_div: 2,
        },
        MuxDivDesc {
            name: "apcc-cci-clk",
            reg_offset: 0x1c0050,
            enable_reg: 0x1c0058,
            enable_mask: bit(0),
            parent_map: &C0_C1_CCI_PARENTS,
            boot_div: 5,
        },
    ],
    plls: &[AlphaPllDesc {
        name: "apcc-hfpll-c0",
        offset: 0x105000,
        regs: &HFPLL_REGS,
        flavor: PllFlavor::Huayra,
        config: Some(&MSM8953_PLL_CONFIG),
        boot_rate: 806_400 * KHz,
    }],
    cci: Some((APCC_CLK_CCI, [APCC_CLK_C0, APCC_CLK_C1])),
    max_register: 0x1c0100,
};

static APCC_SDM632: TreeDesc = TreeDesc {
    muxes: &[
        MuxDivDesc {
            name: "apcc-c0-clk",
            reg_offset: 0x100050,
            enable_reg: 0x100058,
            enable_mask: bit(0),
            parent_map: &C0_C1_CCI_PARENTS,
            boot_div: 2,
        },
        MuxDivDesc {
            name: "apcc-c1-clk",
            reg_offset: 0x000050,
            enable_reg: 0x000058,
            enable_mask: bit(0),
            parent_map: &SDM632_C1_PARENTS,
            boot_div: 2,
        },
        MuxDivDesc {
            name: "apcc-cci-clk",
            reg_offset: 0x1c0050,
            enable_reg: 0x1c0058,
            enable_mask: bit(0),
            parent_map: &SDM632_CCI_PARENTS,
            boot_div: 5,
        },
    ],
    plls: &[
        AlphaPllDesc {
            name: "apcc-hfpll-c0",
            offset: 0x105000,
            regs: &HFPLL_REGS,
            flavor: PllFlavor::Huayra,
            config: Some(&SDM632_PLL_CONFIG),
            boot_rate: 806_400 * KHz,
        },
        AlphaPllDesc {
            name: "apcc-hfpll-c1",
            offset: 0x005000,
            regs: &HFPLL_REGS,
            flavor: PllFlavor::Huayra,
            config: Some(&SDM632_PLL_CONFIG),
            boot_rate: 806_400 * KHz,
        },
        AlphaPllDesc {
            name: "apcc-hfpll-cci",
            offset: 0x1bf000,
            regs: &HFPLL_REGS,
            flavor: PllFlavor::Huayra,
            config: Some(&SDM632_CCI_PLL_CONFIG),
            boot_rate: 806_400 * KHz,
        },
    ],
    cci: Some((APCC_CLK_CCI, [APCC_CLK_C0, APCC_CLK_C1])),
    max_register: 0x1c0100,
};

impl<R: Regmap> ClockTree<R> {
    /// Bring the controller into a known state
    ///
    /// The HFPLLs get their static configuration, every mux is parked on
    /// GPLL0 with its boot divider and its branch enabled, observers are
    /// attached, and finally the HFPLLs are moved to their boot rate.
    pub fn probe(&mut self) -> Result<(), ErrorKind> {
        let desc = self.variant.desc();
        info!("{}: probe", self.variant.compatible());

        for pll in self.plls.iter() {
            if let Some(config) = pll.desc().config {
                pll.configure(&mut self.regmap, config)?;
            }
        }

        for i in 0..self.muxes.len() {
            let md = &mut self.muxes[i];
            let div = md.desc().boot_div;
            md.set_src_div_cache(&mut self.regmap, GPLL_SEL, div)?;
            md.set_freq(recalc_rate(self.gpll_rate, div));
            md.enable(&mut self.regmap)?;
        }

        for i in 0..self.muxes.len() {
            let mux = MuxId(i);
            for parent in self.muxes[i].desc().parent_map {
                if let Source::Hfpll(pll) = parent.src {
                    self.on_rate_change(ClkRef::Pll(pll), Observer::ReparentGuard { mux, pll })?;
                }
            }
        }

        if let Some((cci, clusters)) = desc.cci {
            for cluster in clusters {
                self.on_rate_change(ClkRef::Mux(cluster), Observer::CciTracker { cci, clusters })?;
            }
        }

        for i in 0..self.plls.len() {
            let pdesc = self.plls[i].desc();
            if pdesc.boot_rate != 0 {
                self.set_pll_rate(PllId(i), pdesc.boot_rate)?;
                self.enable_pll(PllId(i))?;
            }
            debug!("{}: {} Hz", pdesc.name, self.plls[i].rate());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatible_lookup() {
        assert_eq!(Variant::from_compatible("qcom,sdm632-apcc"), Ok(Variant::Sdm632));
        assert_eq!(Variant::from_compatible("qcom,msm8953-apcc"), Ok(Variant::Msm8953));
        assert_eq!(Variant::from_compatible("qcom,apcs-msm8953"), Ok(Variant::ApcsMsm8953));
        assert_eq!(Variant::from_compatible("qcom,msm8996-apcc"), Err(ErrorKind::Unimplemented));
        assert_eq!(Variant::Sdm632.compatible(), "qcom,sdm632-apcc");
    }

    #[test]
    fn probe_wires_observers_per_topology() {
        use crate::qcom::apcc::{SimRegmap, TolerancePolicy, APCC_CLK_HFPLL_CCI, GPLL0_HZ};

        let mut t = ClockTree::new(
            SimRegmap::for_variant(Variant::Sdm632),
            Variant::Sdm632,
            GPLL0_HZ,
            TolerancePolicy::default(),
        );
        t.probe().unwrap();

        let tracker = Observer::CciTracker { cci: APCC_CLK_CCI, clusters: [APCC_CLK_C0, APCC_CLK_C1] };
        assert_eq!(
            t.pll(APCC_CLK_HFPLL_C0).unwrap().nb.as_slice(),
            &[Observer::ReparentGuard { mux: APCC_CLK_C0, pll: APCC_CLK_HFPLL_C0 }]
        );
        assert_eq!(
            t.pll(APCC_CLK_HFPLL_C1).unwrap().nb.as_slice(),
            &[Observer::ReparentGuard { mux: APCC_CLK_C1, pll: APCC_CLK_HFPLL_C1 }]
        );
        assert!(t.pll(APCC_CLK_HFPLL_CCI).unwrap().nb.is_empty());
        assert_eq!(t.mux(APCC_CLK_C0).unwrap().nb.as_slice(), &[tracker]);
        assert_eq!(t.mux(APCC_CLK_C1).unwrap().nb.as_slice(), &[tracker]);
        assert!(t.mux(APCC_CLK_CCI).unwrap().nb.is_empty());

        for (_, pll) in t.plls() {
            assert_eq!(pll.rate(), 806_400_000);
            assert!(pll.is_enabled());
        }
        for (id, md) in t.muxes() {
            assert_eq!(md.src(), GPLL_SEL);
            assert_eq!(md.div(), md.desc().boot_div, "{:?}", id);
        }
    }

    #[test]
    fn register_blocks_fit_the_map() {
        for (_, v) in OF_MATCH {
            let desc = v.desc();
            for md in desc.muxes {
                assert!(md.reg_offset + 4 <= desc.max_register);
                assert!(md.parent_map.iter().any(|p| p.src == Source::Gpll));
            }
            for pll in desc.plls {
                assert!(pll.offset + pll.regs.test_ctl_u <= desc.max_register);
            }
        }
    }
}
