// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use skyview::constellation::BoundsTable;
use skyview::image_utils::{encode_png, load_gray_image, synthesize_star_field};
use skyview::nova_client::NovaSolver;
use skyview::pattern_match::SubsetMatcher;
use skyview::pipeline::{attribute_field, AttributionMethod};
use skyview::solver_trait::PlateSolver;
use skyview::star_detect::DETECT_THRESHOLD;

#[derive(Parser, Debug)]
#[command(author, version,
          about = "Attributes a star field image to a constellation, by \
                   remote plate solving or geometric pattern matching.",
          long_about = None)]
struct Args {
    /// Image to analyze. When omitted, a synthetic demo field is generated.
    image: Option<PathBuf>,

    /// nova.astrometry.net API key.
    #[arg(long, default_value = "")]
    api_key: String,

    /// Star detection threshold, 0-255 pixel value.
    #[arg(long, default_value_t = DETECT_THRESHOLD)]
    threshold: u8,

    /// Plate solve timeout, seconds. Defaults to the solver's own timeout.
    #[arg(long, value_parser = parse_duration)]
    solve_timeout: Option<Duration>,

    /// Submission status poll interval, seconds.
    #[arg(long, value_parser = parse_duration, default_value = "5.0")]
    poll_interval: Duration,
}

// Adapted from
// https://stackoverflow.com/questions/72313616/using-claps-deriveparser-how-can-i-accept-a-stdtimeduration
fn parse_duration(arg: &str) -> Result<Duration, std::num::ParseFloatError> {
    let seconds = arg.parse()?;
    Ok(Duration::from_secs_f64(seconds))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let image = match &args.image {
        Some(path) => match load_gray_image(path) {
            Ok(image) => image,
            Err(e) => {
                error!("{}", e.message);
                std::process::exit(1);
            }
        },
        None => {
            info!("No image given; generating a synthetic 500x500 star field");
            let mut rng = StdRng::from_entropy();
            let image = synthesize_star_field(500, 500, 50, &mut rng);
            if let Err(e) = image.save("synthetic_sky.png") {
                warn!("Could not save synthetic field: {:?}", e);
            }
            image
        }
    };

    let image_png = match encode_png(&image) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("{}", e.message);
            std::process::exit(1);
        }
    };

    let mut solver = NovaSolver::new(&args.api_key);
    let solve_timeout =
        args.solve_timeout.unwrap_or_else(|| solver.default_timeout());
    solver.set_solve_timeout(solve_timeout);
    solver.set_poll_interval(args.poll_interval);
    let lookup = BoundsTable::new();
    let matcher = SubsetMatcher::default();

    let result = attribute_field(&image, &image_png, args.threshold,
                                 &solver, &lookup, &matcher).await;

    println!("Detected {} stars", result.stars.len());
    if let Some(failure) = &result.solve_failure {
        println!("Plate solving failed: {}", failure);
    }
    match result.constellation.as_deref() {
        Some(name) => match result.method {
            AttributionMethod::PlateSolve => {
                println!("Constellation (majority vote): {}", name);
                for (voted, count) in &result.votes {
                    println!("  {}: {}", voted, count);
                }
            }
            AttributionMethod::PatternMatch => {
                println!("Constellation (pattern match): {}", name);
                for ((sx, sy), _) in &result.matched_pairs {
                    println!("  matched star at ({:.3}, {:.3}) normalized",
                             sx, sy);
                }
            }
        },
        None => println!("Constellation: Unknown"),
    }
}
