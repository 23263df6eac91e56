//! Trajectory smoother executable entry point.
//!
//! Smooths a reference trajectory read from a JSON file and writes the optimized trajectory back
//! out as JSON. The execution consists of:
//!
//!     - Session and logger initialisation
//!     - Parameter loading
//!     - Reference trajectory loading
//!     - Problem initialisation and optimization
//!     - Writing the optimized trajectory and archiving the solve report

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, warn};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use structopt::StructOpt;

// Internal
use smoother_lib::{
    smoother::{Params, TrajSmoother},
    trajectory::DiscretizedTrajectory,
};
use util::{
    archive::Archiver,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Smooth a reference trajectory into one the vehicle can follow.
#[derive(Debug, StructOpt)]
#[structopt(name = "smoother_exec")]
struct Opt {
    /// Path to the smoother parameter file
    #[structopt(short, long, parse(from_os_str), default_value = "params/smoother.toml")]
    params: PathBuf,

    /// Path to the reference trajectory JSON file
    #[structopt(parse(from_os_str))]
    input: PathBuf,

    /// Path the optimized trajectory JSON will be written to
    #[structopt(short, long, parse(from_os_str), default_value = "optimized_trajectory.json")]
    output: PathBuf,

    /// Override the subsampling factor from the parameter file
    #[structopt(short, long)]
    subsampling: Option<usize>,

    /// Directory sessions are created in
    #[structopt(long, parse(from_os_str), default_value = "sessions")]
    sessions_dir: PathBuf,

    /// Minimum level of log messages
    #[structopt(long, default_value = "info")]
    log_level: LevelFilter,

    /// Minimum level of log messages from the solver backends
    #[structopt(long, default_value = "info")]
    solver_log_level: LevelFilter,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("smoother_exec", &opt.sessions_dir)
        .wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(opt.log_level, opt.solver_log_level, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Trajectory Smoother Executable\n");
    info!("Session directory: {:?}\n", session.session_root);
    debug!("CLI arguments: {:?}", opt);

    // ---- LOAD PARAMETERS ----

    let mut params: Params =
        util::params::load(&opt.params).wrap_err("Could not load smoother params")?;

    if let Some(subsampling) = opt.subsampling {
        info!(
            "Overriding subsampling factor {} with {}",
            params.subsampling, subsampling
        );
        params.subsampling = subsampling;
    }

    info!("Smoother parameters loaded");

    // ---- LOAD REFERENCE ----

    let reference: DiscretizedTrajectory = serde_json::from_reader(BufReader::new(
        File::open(&opt.input)
            .wrap_err_with(|| format!("Cannot open reference trajectory {:?}", opt.input))?,
    ))
    .wrap_err("Cannot parse the reference trajectory")?;

    info!(
        "Loaded reference trajectory with {} points, {:.3} m long",
        reference.len(),
        reference.length()
    );

    // ---- SMOOTH ----

    let planning_init_point = *reference
        .front()
        .ok_or_else(|| eyre!("The reference trajectory is empty"))?;

    let mut smoother = TrajSmoother::new(params);
    let subsampling = smoother.params().subsampling;

    smoother
        .initialise_problem(subsampling, &reference, &planning_init_point)
        .wrap_err("Failed to initialise the smoothing problem")?;

    if !smoother.is_ready() {
        warn!("Nothing to smooth, the reference is written out unchanged");
        write_trajectory(&opt.output, &reference)?;
        return Ok(());
    }

    let status = smoother.optimize();

    let mut archiver = Archiver::from_path(&session, "smoother/solve_report.csv")
        .wrap_err("Cannot create the solve report archive")?;
    archiver
        .serialise(smoother.report())
        .wrap_err("Cannot archive the solve report")?;

    if !status.is_success() {
        return Err(eyre!(
            "Smoothing failed with status {:?} (code {})",
            status,
            status.code()
        ));
    }

    let optimized = smoother
        .get_optimized_trajectory()
        .wrap_err("Cannot build the optimized trajectory")?;

    info!(
        "Optimized trajectory has {} points, {:.3} m long",
        optimized.len(),
        optimized.length()
    );

    write_trajectory(&opt.output, &optimized)?;

    info!("End of execution");

    Ok(())
}

/// Write a trajectory to a JSON file.
fn write_trajectory(path: &Path, traj: &DiscretizedTrajectory) -> Result<(), Report> {
    let file = File::create(path).wrap_err_with(|| format!("Cannot create {:?}", path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), traj)
        .wrap_err("Cannot serialise the trajectory")?;

    info!("Trajectory written to {:?}", path);

    Ok(())
}
