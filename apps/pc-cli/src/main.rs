use clap::{Parser, Subcommand};
use pc_app::{
    AppResult, ServeOutcome, SimulateOptions, SimulationReport, load_config, records_to_csv,
    render_yaml, serve, simulate, summarize,
};
use pc_runtime::RuntimeError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pc-cli")]
#[command(about = "Process control CLI - PID loop with Modbus TCP and OPC UA access", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a config file
    Validate {
        /// Path to the config file (.yaml, .yml or .json)
        config_path: PathBuf,
    },
    /// Print the effective config with defaults filled in
    ShowConfig {
        /// Path to the config file
        config_path: PathBuf,
    },
    /// Run the loop offline against the simulated plant
    Simulate {
        /// Path to the config file
        config_path: PathBuf,
        /// Number of ticks to run
        #[arg(long, default_value_t = 100)]
        ticks: u64,
        /// Override the initial setpoint
        #[arg(long)]
        setpoint: Option<f64>,
        /// Output CSV file path (optional, defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run the loop with its Modbus and OPC UA servers until Ctrl-C
    Serve {
        /// Path to the config file
        config_path: PathBuf,
    },
}

fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config_path } => cmd_validate(&config_path),
        Commands::ShowConfig { config_path } => cmd_show_config(&config_path),
        Commands::Simulate {
            config_path,
            ticks,
            setpoint,
            output,
        } => cmd_simulate(&config_path, ticks, setpoint, output.as_deref()),
        Commands::Serve { config_path } => cmd_serve(&config_path),
    }
}

fn cmd_validate(config_path: &Path) -> AppResult<()> {
    println!("Validating config: {}", config_path.display());
    let config = load_config(config_path)?;
    let summary = summarize(&config);
    println!("✓ Config is valid: {}", summary.name);
    let (kp, ki, kd) = summary.gains;
    println!("  gains         kp={} ki={} kd={}", kp, ki, kd);
    println!(
        "  output        [{}, {}]",
        summary.output_limits.0, summary.output_limits.1
    );
    println!("  setpoint      {}", summary.setpoint);
    println!(
        "  period        {} s (escalate after {} faults)",
        summary.period_s, summary.fault_threshold
    );
    println!("  faults        {} scheduled", summary.scheduled_faults);
    println!(
        "  modbus        {}",
        summary.modbus.as_deref().unwrap_or("disabled")
    );
    println!(
        "  opc ua        {}",
        summary.opcua.as_deref().unwrap_or("disabled")
    );
    Ok(())
}

fn cmd_show_config(config_path: &Path) -> AppResult<()> {
    let config = load_config(config_path)?;
    print!("{}", render_yaml(&config)?);
    Ok(())
}

fn cmd_simulate(
    config_path: &Path,
    ticks: u64,
    setpoint: Option<f64>,
    output: Option<&Path>,
) -> AppResult<()> {
    let config = load_config(config_path)?;
    let report = simulate(&config, &SimulateOptions { ticks, setpoint })?;

    if let Some(path) = output {
        std::fs::write(path, records_to_csv(&report.records))?;
        let last = report.final_snapshot;
        println!(
            "✓ Simulated {} ticks of {} to {}",
            report.records.len(),
            config.name,
            path.display()
        );
        println!(
            "  final: setpoint={} measurement={:.3} output={:.3} status={}",
            last.setpoint,
            last.measurement,
            last.output,
            last.status.as_str()
        );
        println!(
            "  tick compute: avg {:.1} us, max {:.1} us",
            report.timing.average_s * 1e6,
            report.timing.max_s * 1e6
        );
        report_escalation(&report, &mut std::io::stderr())?;
    } else {
        write_csv(&report, &mut std::io::stdout().lock(), &mut std::io::stderr())?;
    }
    Ok(())
}

/// CSV goes to `out`; anything else goes to `diag` so piped output stays
/// parseable.
fn write_csv(
    report: &SimulationReport,
    out: &mut impl Write,
    diag: &mut impl Write,
) -> std::io::Result<()> {
    out.write_all(records_to_csv(&report.records).as_bytes())?;
    out.flush()?;
    report_escalation(report, diag)
}

fn report_escalation(report: &SimulationReport, diag: &mut impl Write) -> std::io::Result<()> {
    if report.escalated {
        writeln!(diag, "✗ Loop stopped on sensor fault escalation")?;
    }
    Ok(())
}

fn cmd_serve(config_path: &Path) -> AppResult<()> {
    let config = load_config(config_path)?;
    let runtime = tokio::runtime::Runtime::new()?;

    let report = runtime.block_on(async {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Ctrl-C received, shutting down"),
                Err(err) => tracing::error!(%err, "cannot listen for Ctrl-C, shutting down"),
            }
            let _ = shutdown_tx.send(true);
        });
        serve(&config, shutdown_rx).await
    })?;

    let last = report.final_snapshot;
    println!(
        "✓ Stopped after {} ticks: setpoint={} measurement={:.3} output={:.3}",
        last.tick, last.setpoint, last.measurement, last.output
    );
    match report.outcome {
        ServeOutcome::Shutdown(_) => Ok(()),
        ServeOutcome::Escalated {
            consecutive,
            safe_output,
        } => Err(RuntimeError::SensorFaultEscalation {
            consecutive,
            safe_output,
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fault_drill() -> SimulationReport {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../configs/sensor_faults.yaml");
        let config = load_config(&path).unwrap();
        simulate(
            &config,
            &SimulateOptions {
                ticks: 100,
                setpoint: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn escalation_notice_stays_out_of_csv() {
        let report = fault_drill();
        assert!(report.escalated);

        let mut out = Vec::new();
        let mut diag = Vec::new();
        write_csv(&report, &mut out, &mut diag).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), records_to_csv(&report.records));
        assert!(String::from_utf8(diag).unwrap().contains("sensor fault escalation"));
    }
}
