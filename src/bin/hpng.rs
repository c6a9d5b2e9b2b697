use anyhow::{Context, Result, anyhow};
use hpng::checker::Checker;
use hpng::config::EngineConfig;
use hpng::net::io::write_json;
use hpng::options::{Axis, Options, RunKind};
use hpng::report::{LogSink, RunReport};
use hpng::sweep::GridSpec;

fn grid(axis: Axis, default_end: f64) -> GridSpec {
    GridSpec::new(axis.start, axis.end.unwrap_or(default_end), axis.step)
}

fn main() -> Result<()> {
    if std::env::var("HPNG_LOG").is_ok() {
        let e = env_logger::Env::new()
            .filter("HPNG_LOG")
            .write_style("HPNG_LOG_STYLE");
        env_logger::init_from_env(e);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let parsed = if args.is_empty() {
        Options::parse_from_str(&std::env::var("HPNG_FLAGS").unwrap_or_default())
    } else {
        Options::parse_from_args(&args)
    };
    let options = match parsed {
        Ok(options) => options,
        Err(err) => match err.downcast::<clap::Error>() {
            Ok(clap_err) => clap_err.exit(),
            Err(err) => return Err(anyhow!(err)),
        },
    };
    log::debug!("hpng options: {:?}", options);

    let mut config = EngineConfig::load_from_file(&options.config)?;
    if let Some(horizon) = options.horizon {
        config.horizon = horizon;
    }
    if let Some(seed) = options.seed {
        config.seed = seed;
    }
    if let Some(dir) = &options.output_dir {
        config.output_dir = dir.clone();
    }
    let horizon = config.horizon;

    let mut checker = Checker::new(config);
    checker
        .load_model(&options.model)
        .with_context(|| format!("Failed to load model {:?}", options.model))?;

    let mut sink = LogSink;
    let report: RunReport = match &options.run {
        RunKind::Diagram => checker.diagram_summary(&mut sink)?,
        RunKind::Curve {
            place,
            constant,
            times,
        } => {
            checker
                .probability_curve(place, *constant, grid(*times, horizon), &mut sink)?
                .1
        }
        RunKind::Surface {
            place,
            times,
            constants,
        } => {
            // 非流体库所在 probability_surface 中报错
            let ceiling = checker.model()?.level_ceiling(place).unwrap_or(constants.start);
            checker
                .probability_surface(
                    place,
                    grid(*times, horizon),
                    grid(*constants, ceiling),
                    &mut sink,
                )?
                .1
        }
        RunKind::Check {
            formula,
            at_time,
            threshold,
        } => {
            checker
                .model_check(formula, *at_time, *threshold, &mut sink)
                .with_context(|| format!("Failed to check `{formula}`"))?
                .1
        }
    };

    println!("{}", report);
    if let Some(path) = &options.json {
        write_json(path, &report).with_context(|| format!("Failed to write {:?}", path))?;
    }
    Ok(())
}
