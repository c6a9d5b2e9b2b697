//! Parsing Options.
//! `hpng -m model.json <diagram|curve|surface|check> ...`

use clap::{Arg, ArgMatches, Command, value_parser};
use std::error::Error;
use std::path::PathBuf;

pub type OptionsError = Box<dyn Error + Send + Sync>;

/// An inclusive grid axis. When `end` is omitted the time axis runs to the horizon
/// and the level axis to the place's capacity, or its initial level without one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Axis {
    pub start: f64,
    pub end: Option<f64>,
    pub step: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunKind {
    Diagram,
    Curve {
        place: String,
        constant: f64,
        times: Axis,
    },
    Surface {
        place: String,
        times: Axis,
        constants: Axis,
    },
    Check {
        formula: String,
        at_time: f64,
        threshold: Option<f64>,
    },
}

const TIME_AXIS: [&str; 3] = ["t-start", "t-end", "t-step"];
const LEVEL_AXIS: [&str; 3] = ["c-start", "c-end", "c-step"];

fn axis_args(command: Command, ids: [&'static str; 3], what: &str) -> Command {
    let [start, end, step] = ids;
    command
        .arg(
            Arg::new(start)
                .long(start)
                .help(format!("First {what} of the grid"))
                .value_parser(value_parser!(f64))
                .default_value("0"),
        )
        .arg(
            Arg::new(end)
                .long(end)
                .help(format!("Last {what} of the grid (inclusive)"))
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new(step)
                .long(step)
                .help(format!("Grid step between two {what}s"))
                .value_parser(value_parser!(f64))
                .default_value("1"),
        )
}

fn place_arg() -> Arg {
    Arg::new("place")
        .short('p')
        .long("place")
        .help("Fluid place whose level is swept")
        .required(true)
}

fn make_options_parser() -> Command {
    let curve = axis_args(
        Command::new("curve")
            .about("Probability over time for a fixed fluid level")
            .arg(place_arg())
            .arg(
                Arg::new("constant")
                    .long("constant")
                    .help("Fluid level constant")
                    .value_parser(value_parser!(f64))
                    .required(true),
            ),
        TIME_AXIS,
        "time",
    );
    let surface = axis_args(
        axis_args(
            Command::new("surface")
                .about("Probability over time and fluid level")
                .arg(place_arg()),
            TIME_AXIS,
            "time",
        ),
        LEVEL_AXIS,
        "level",
    );
    let check = Command::new("check")
        .about("Check a formula")
        .arg(
            Arg::new("formula")
                .short('f')
                .long("formula")
                .help("Formula text, e.g. `tank >= 5 U[0,3] on == 0`")
                .required(true),
        )
        .arg(
            Arg::new("at")
                .long("at")
                .help("Check time")
                .value_parser(value_parser!(f64))
                .default_value("0"),
        )
        .arg(
            Arg::new("threshold")
                .long("threshold")
                .help("Probability bound the verdict is compared against")
                .value_parser(value_parser!(f64)),
        );

    Command::new("hpng")
        .no_binary_name(true)
        .version("v0.1.0")
        .subcommand_required(true)
        .arg(
            Arg::new("model")
                .short('m')
                .long("model")
                .value_name("FILE")
                .help("Model file (.json or .ron)")
                .value_parser(value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Engine configuration (TOML)")
                .value_parser(value_parser!(PathBuf))
                .default_value("hpng.toml"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Directory for .dot and .dat files")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("horizon")
                .long("horizon")
                .value_parser(value_parser!(f64)),
        )
        .arg(Arg::new("seed").long("seed").value_parser(value_parser!(u64)))
        .arg(
            Arg::new("json")
                .long("json")
                .value_name("FILE")
                .help("Also write the run report as JSON")
                .value_parser(value_parser!(PathBuf)),
        )
        .subcommand(Command::new("diagram").about("Build the region diagram and write it as DOT"))
        .subcommand(curve)
        .subcommand(surface)
        .subcommand(check)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub model: PathBuf,
    pub config: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub horizon: Option<f64>,
    pub seed: Option<u64>,
    pub json: Option<PathBuf>,
    pub run: RunKind,
}

fn required<T: Clone + Send + Sync + 'static>(
    matches: &ArgMatches,
    id: &str,
) -> Result<T, OptionsError> {
    matches
        .get_one::<T>(id)
        .cloned()
        .ok_or_else(|| format!("missing argument `{id}`").into())
}

fn axis(matches: &ArgMatches, ids: [&str; 3]) -> Result<Axis, OptionsError> {
    let [start, end, step] = ids;
    Ok(Axis {
        start: required(matches, start)?,
        end: matches.get_one::<f64>(end).copied(),
        step: required(matches, step)?,
    })
}

impl Options {
    pub fn parse_from_str(s: &str) -> Result<Self, OptionsError> {
        let flags = shellwords::split(s)?;
        Self::parse_from_args(&flags)
    }

    pub fn parse_from_args(flags: &[String]) -> Result<Self, OptionsError> {
        let app = make_options_parser();
        let matches = app.try_get_matches_from(flags.iter())?;

        let run = match matches.subcommand() {
            Some(("diagram", _)) => RunKind::Diagram,
            Some(("curve", sub)) => RunKind::Curve {
                place: required(sub, "place")?,
                constant: required(sub, "constant")?,
                times: axis(sub, TIME_AXIS)?,
            },
            Some(("surface", sub)) => RunKind::Surface {
                place: required(sub, "place")?,
                times: axis(sub, TIME_AXIS)?,
                constants: axis(sub, LEVEL_AXIS)?,
            },
            Some(("check", sub)) => RunKind::Check {
                formula: required(sub, "formula")?,
                at_time: required(sub, "at")?,
                threshold: sub.get_one::<f64>("threshold").copied(),
            },
            _ => return Err("UnsupportedRunKind".into()),
        };

        Ok(Options {
            model: required(&matches, "model")?,
            config: required(&matches, "config")?,
            output_dir: matches.get_one::<PathBuf>("output").cloned(),
            horizon: matches.get_one::<f64>("horizon").copied(),
            seed: matches.get_one::<u64>("seed").copied(),
            json: matches.get_one::<PathBuf>("json").cloned(),
            run,
        })
    }
}
