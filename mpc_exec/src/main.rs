//! Main MPC controller executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise all modules
//!     - Main loop (fixed period):
//!         - Telemetry acquisition from the plant
//!         - MpcCtrl processing (frame transform, fit, solve)
//!         - Command delivery to the plant
//!         - Cycle management
//!
//! The loop runs closed against the built-in simulation plant (`sim`). An
//! external transport would replace the plant with its own telemetry source
//! and command sink, the controller itself is unchanged.
//!
//! All control modules shall provide a public struct implementing the
//! `util::module::State` trait.

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use mpc_lib::{
    mpc_ctrl::{ActuatorCmd, MpcCtrl, MpcCtrlError, OutputData, StatusReport},
    sim::Sim,
};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{info, warn};
use std::env;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use util::{
    logger::{logger_init, LevelFilter},
    module::State,
    raise_error,
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Target period of one cycle.
const CYCLE_PERIOD_S: f64 = 0.10;

/// Number of cycles to run if none is given on the command line.
const DEFAULT_NUM_CYCLES: u64 = 600;

/// Cycle interval between periodic status reports in the log.
const STATUS_REPORT_INTERVAL_CYCLES: u64 = 10;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    color_eyre::install()?;

    // Initialise session
    let session =
        Session::new("mpc_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("MPC Controller Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- PROCESS ARGUMENTS ----

    // A single optional argument gives the number of cycles to run.
    let args: Vec<String> = env::args().collect();

    let num_cycles = match args.len() {
        1 => DEFAULT_NUM_CYCLES,
        2 => args[1]
            .parse::<u64>()
            .wrap_err("Could not parse the cycle count argument")?,
        _ => {
            return Err(eyre!(
                "Expected either zero or one argument, found {}",
                args.len() - 1
            ))
        }
    };

    info!("Running for {} cycles\n", num_cycles);

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let mut mpc_ctrl = MpcCtrl::default();
    mpc_ctrl
        .init("mpc_ctrl.toml", &session)
        .wrap_err("Failed to initialise MpcCtrl")?;
    info!(
        "MpcCtrl init complete (target speed {} m/s, {} step horizon)",
        mpc_ctrl.params().ref_speed_ms,
        mpc_ctrl.params().num_pred_steps
    );

    let sim_params: mpc_lib::sim::Params =
        util::params::load("sim.toml").wrap_err("Could not load sim params")?;
    sim_params
        .validate()
        .wrap_err("Sim parameters are invalid")?;
    let mut sim = Sim::new(sim_params);
    info!("Sim plant init complete");

    info!("Module initialisation complete\n");

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let mut num_cycles_run = 0u64;
    let mut last_output = OutputData::default();
    let mut last_report = StatusReport::default();

    while num_cycles_run < num_cycles {
        // Get cycle start time
        let cycle_start_instant = Instant::now();

        // ---- TELEMETRY ACQUISITION ----

        let telem = sim.telemetry();

        // ---- CONTROL ALGORITHM PROCESSING ----

        let input = match telem.into_input_data() {
            Ok(i) => Some(i),
            Err(e) => {
                warn!("Telemetry rejected: {}", e);
                None
            }
        };

        let cmd = match input {
            Some(ref input) => match mpc_ctrl.proc(input) {
                Ok((output, report)) => {
                    last_output = output;
                    last_report = report;
                    last_output.cmd
                }
                // Tick-local errors degrade to the null command, the loop
                // carries on with the next telemetry tick
                Err(MpcCtrlError::NotInitialised) => {
                    raise_error!("MpcCtrl was not initialised before the main loop");
                }
                Err(e) => {
                    warn!("Error during MpcCtrl processing: {}", e);
                    ActuatorCmd::default()
                }
            },
            None => ActuatorCmd::default(),
        };

        // ---- COMMAND DELIVERY ----

        sim.step(cmd);

        // ---- STATUS REPORTING ----

        if num_cycles_run % STATUS_REPORT_INTERVAL_CYCLES == 0 {
            info!(
                "Cycle {:4}: speed {:5.2} m/s, cte {:+.3} m, psi_err {:+.4} rad, \
                steer {:+.4} rad, accel {:+.3}, {} iters{}{}",
                num_cycles_run,
                sim.speed_ms(),
                last_report.cte_m,
                last_report.heading_err_rad,
                last_output.cmd.steer_rad,
                last_output.cmd.accel,
                last_report.solve_iterations,
                if last_report.solve_converged { "" } else { " (not converged)" },
                if last_report.safe_cmd_issued { " (SAFE CMD)" } else { "" },
            );
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        // Get sleep duration
        match Duration::from_secs_f64(CYCLE_PERIOD_S).checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - CYCLE_PERIOD_S
                );
            }
        }

        // Increment cycle counter
        num_cycles_run += 1;
    }

    // ---- SHUTDOWN ----

    info!(
        "End of execution: final speed {:.2} m/s, track offset {:+.3} m",
        sim.speed_ms(),
        sim.track_offset_m()
    );

    Ok(())
}
