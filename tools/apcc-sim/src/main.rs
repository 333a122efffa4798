use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::Verbosity;
use device::ErrorKind;
use log::{error, info};
use qclk_soc::qcom::apcc::{
    div_rate, solve, Apcc, ClockTree, MuxId, SimRegmap, Source, TolerancePolicy, Variant, APCC_CLK_C0,
    APCC_CLK_C1, APCC_CLK_CCI, GPLL0_HZ,
};
use std::process::exit;

/// Drive the MSM8953/SDM632 CPU clock controller against a simulated register file
#[derive(Parser)]
#[command(name = "apcc-sim", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    verbose: Verbosity,
}

#[derive(Subcommand)]
enum Command {
    /// Find the half-integer divider taking PARENT to RATE
    Solve {
        #[arg(long)]
        parent: u64,
        #[arg(long)]
        rate: u64,
        /// Remainder of 2 * parent / rate allowed
        #[arg(long, default_value_t = 0)]
        tolerance: u64,
    },
    /// Probe a controller and apply rate requests in order
    Request {
        /// Devicetree compatible of the controller
        #[arg(long, default_value = "qcom,msm8953-apcc")]
        soc: String,
        /// Rate GPLL0 was left at by the boot chain
        #[arg(long, default_value_t = GPLL0_HZ)]
        gpll: u64,
        #[arg(long, value_enum, default_value_t = Policy::GpllSlack)]
        policy: Policy,
        /// Requests as CLOCK=HZ, CLOCK being c0, c1 or cci
        #[arg(value_parser = parse_request)]
        requests: Vec<(MuxId, u64)>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    GpllSlack,
    Literal,
}

impl From<Policy> for TolerancePolicy {
    fn from(p: Policy) -> Self {
        match p {
            Policy::GpllSlack => Self::GpllSlack,
            Policy::Literal => Self::Literal,
        }
    }
}

fn parse_request(s: &str) -> Result<(MuxId, u64), String> {
    let (clk, hz) = s
        .split_once('=')
        .ok_or_else(|| format!("expected CLOCK=HZ, got '{s}'"))?;
    let id = match clk {
        "c0" => APCC_CLK_C0,
        "c1" => APCC_CLK_C1,
        "cci" => APCC_CLK_CCI,
        _ => return Err(format!("unknown clock '{clk}'")),
    };
    let hz = hz.parse().map_err(|e| format!("bad rate '{hz}': {e}"))?;
    Ok((id, hz))
}

fn source_name(src: Option<Source>) -> String {
    match src {
        Some(Source::Gpll) => "gpll0".into(),
        Some(Source::Hfpll(pll)) => format!("hfpll{}", pll.0),
        None => "?".into(),
    }
}

fn dump(tree: &mut ClockTree<SimRegmap>) -> Result<(), ErrorKind> {
    println!(
        "{:<16} {:<8} {:>4} {:>12} {:>12}",
        "clock", "parent", "div", "rate", "requested"
    );
    for i in 0..tree.muxes().count() {
        let id = MuxId(i);
        let (src, div) = tree.read_source_divider(id)?;
        let rate = tree.rate(id)?;
        let md = tree.mux(id)?;
        println!(
            "{:<16} {:<8} {:>4} {:>12} {:>12}",
            md.name(),
            source_name(md.source_of(src)),
            div,
            rate,
            md.freq()
        );
    }
    for (_, pll) in tree.plls() {
        println!(
            "{:<16} {:<8} {:>4} {:>12} {:>12}",
            pll.name(),
            "xo",
            "",
            pll.rate(),
            if pll.is_enabled() { "on" } else { "off" }
        );
    }
    Ok(())
}

fn request(
    soc: &str,
    gpll: u64,
    policy: TolerancePolicy,
    requests: &[(MuxId, u64)],
) -> Result<(), ErrorKind> {
    let variant = Variant::from_compatible(soc)?;
    let apcc = Apcc::probe(SimRegmap::for_variant(variant), soc, gpll, policy)?;

    for (id, hz) in requests {
        match apcc.request_rate(*id, *hz) {
            Ok(rate) => info!("{:?}: asked {} Hz, got {} Hz", id, hz, rate),
            Err(e) => error!("{:?}: {} Hz: {}", id, hz, e),
        }
    }

    apcc.with(dump)
}

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    match cli.command {
        Command::Solve {
            parent,
            rate,
            tolerance,
        } => match solve(parent, rate, tolerance) {
            Some(div) => println!(
                "div {} (field {:#x}) -> {} Hz",
                div,
                div - 1,
                div_rate(parent, div)
            ),
            None => {
                error!("no divider takes {} Hz to {} Hz", parent, rate);
                exit(1);
            }
        },
        Command::Request {
            soc,
            gpll,
            policy,
            requests,
        } => {
            if let Err(e) = request(&soc, gpll, policy.into(), &requests) {
                error!("{}: {}", soc, e);
                exit(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_syntax() {
        assert_eq!(parse_request("c1=1344000000"), Ok((APCC_CLK_C1, 1_344_000_000)));
        assert!(parse_request("c2=1").is_err());
        assert!(parse_request("cci").is_err());
        assert!(parse_request("cci=fast").is_err());
    }

    #[test]
    fn cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
