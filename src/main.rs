use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use wipecert::backend::{BackendSelector, OverwriteSelector, SimulatedSelector, SimulationConfig};
use wipecert::drives::probe_target;
use wipecert::settings::Settings;
use wipecert::ui::ProgressBar;
use wipecert::wipe_orchestrator::LoggingObserver;
use wipecert::*;

#[derive(Parser)]
#[command(name = "wipecert")]
#[command(about = "Removable media sanitization with verifiable wipe certificates")]
#[command(version = "1.0.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Settings file (TOML); defaults to config.toml in the user config dir
    #[arg(long, global = true, env = "WIPECERT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available sanitization profiles
    Profiles,

    /// Sanitize a removable device or disk image
    Wipe {
        /// Block device (e.g., /dev/sdb) or image file
        target: PathBuf,

        /// Sanitization profile (see `profiles`)
        #[arg(short, long)]
        profile: Option<String>,

        /// Device id recorded in the certificate (defaults to the target path)
        #[arg(long)]
        device_id: Option<String>,

        /// Display name recorded in the certificate
        #[arg(long)]
        name: Option<String>,

        /// Run against the simulated backend; nothing is written
        #[arg(long)]
        simulate: bool,

        /// Simulated pass that fails (1-based)
        #[arg(long, requires = "simulate")]
        fail_pass: Option<u32>,

        /// Simulated verification failure
        #[arg(long, requires = "simulate")]
        fail_verification: bool,

        /// Simulated time per pass
        #[arg(long, default_value = "500ms", value_parser = humantime::parse_duration)]
        pass_delay: Duration,

        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,

        /// Do not issue a certificate on success
        #[arg(long)]
        no_certificate: bool,
    },

    /// Print an issued certificate
    Show {
        certificate_id: String,

        /// Print the structured record instead of the document
        #[arg(long)]
        json: bool,
    },

    /// List issued certificates
    ListCertificates,
}

struct WipeArgs {
    target: PathBuf,
    profile: Option<String>,
    device_id: Option<String>,
    name: Option<String>,
    simulate: bool,
    fail_pass: Option<u32>,
    fail_verification: bool,
    pass_delay: Duration,
    yes: bool,
    no_certificate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if !cfg!(feature = "color-output") {
        colored::control::set_override(false);
    }

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    let _log_guard = logging::init_logging(&settings.log_dir, cli.debug);

    setup_signal_handlers()?;

    match cli.command {
        Commands::Profiles => list_profiles(&settings),
        Commands::Wipe {
            target,
            profile,
            device_id,
            name,
            simulate,
            fail_pass,
            fail_verification,
            pass_delay,
            yes,
            no_certificate,
        } => {
            let args = WipeArgs {
                target,
                profile,
                device_id,
                name,
                simulate,
                fail_pass,
                fail_verification,
                pass_delay,
                yes,
                no_certificate,
            };
            wipe_target(&settings, args).await?;
        }
        Commands::Show {
            certificate_id,
            json,
        } => show_certificate(&settings, &certificate_id, json)?,
        Commands::ListCertificates => list_certificates(&settings)?,
    }

    Ok(())
}

fn list_profiles(settings: &Settings) {
    println!("\n{}", "Sanitization Profiles".bold());
    println!("{}", "=".repeat(72));
    println!(
        "{:<14} {:<24} {:>6} {:>7}  Compliance",
        "Name", "Method", "Passes", "Verify"
    );

    for (name, profile) in settings.profiles() {
        let marker = if name == settings.default_profile { "*" } else { " " };
        println!(
            "{}{:<13} {:<24} {:>6} {:>7}  {} {}",
            marker,
            name,
            profile.method,
            profile.pass_count,
            if profile.verification_required { "yes" } else { "no" },
            profile.compliance.standard,
            profile.compliance.level
        );
    }
    println!("\n* default profile");
}

async fn wipe_target(settings: &Settings, args: WipeArgs) -> Result<()> {
    let profile_name = args
        .profile
        .clone()
        .unwrap_or_else(|| settings.default_profile.clone());
    let profile = settings.profile(&profile_name)?;

    let device = probe_target(&args.target, args.device_id.as_deref(), args.name.as_deref())?;
    device.check_eligible()?;

    println!(
        "\nWARNING: This will permanently erase ALL data on {}",
        args.target.display()
    );
    println!("Device: {} ({})", device.display_name, device.device_id);
    println!("Size: {} bytes", device.capacity_bytes);
    println!(
        "Profile: {} ({} pass{}, verification {})",
        profile.method,
        profile.pass_count,
        if profile.pass_count == 1 { "" } else { "es" },
        if profile.verification_required { "on" } else { "off" }
    );
    if !device.mount_points.is_empty() {
        println!(
            "{} mounted at {}",
            "⚠".yellow(),
            device.mount_points.join(", ")
        );
    }
    if args.simulate {
        println!("{}", "Simulation: no data will be written".cyan());
    }

    if !args.yes && !confirm()? {
        println!("Operation cancelled.");
        return Ok(());
    }

    let selector: Arc<dyn BackendSelector> = if args.simulate {
        Arc::new(SimulatedSelector {
            config: SimulationConfig {
                pass_delay: args.pass_delay,
                fail_pass: args.fail_pass,
                fail_verification: args.fail_verification,
                supports_abort: true,
            },
        })
    } else {
        let selector = OverwriteSelector::new();
        selector.register(device.device_id.clone(), args.target.clone());
        Arc::new(selector)
    };

    let orchestrator =
        SanitizationOrchestrator::new(selector).with_observer(Arc::new(LoggingObserver));

    reset_interrupted();
    let mut handle = orchestrator.start(device.clone(), profile)?;
    let session_id = handle.session_id().to_string();
    println!("\nSession {}\n", session_id);

    let mut bar = ProgressBar::new(settings.progress_width).with_capacity(device.capacity_bytes);
    let mut interrupt_poll = tokio::time::interval(Duration::from_millis(100));
    let mut cancel_sent = false;

    let outcome = loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(SessionEvent::Progress(progress)) => {
                    if cfg!(feature = "progress-bars") {
                        bar.render(&progress);
                    } else {
                        println!("{:>5.1}%  {}", progress.percent_complete, progress.phase);
                    }
                }
                Some(SessionEvent::Finished(outcome)) => break outcome,
                None => bail!("session {} ended without an outcome", session_id),
            },
            _ = interrupt_poll.tick() => {
                if is_interrupted() && !cancel_sent {
                    cancel_sent = true;
                    if let Err(e) = orchestrator.cancel(&session_id) {
                        tracing::warn!(session_id = %session_id, error = %e, "Cancel not accepted");
                    }
                }
            }
        }
    };

    print_outcome(&outcome);

    if let Some(failure) = &outcome.failure {
        bail!(
            "sanitization ended {} [{}]: {}",
            outcome.final_phase,
            failure.reason.code(),
            failure.detail
        );
    }

    if args.no_certificate {
        println!("Certificate issuance skipped.");
        return Ok(());
    }

    let issuer = CertificateIssuer::new(FileCertificateStore::new(&settings.certificate_dir));
    let issued = issuer.issue(&outcome)?;

    println!("\n{}", "✓ Certificate issued".green().bold());
    println!("  ID:       {}", issued.certificate.id);
    println!("  Digest:   {}", issued.certificate.wipe.evidence_digest);
    println!("  Record:   {}", issued.stored.structured.display());
    println!("  Document: {}", issued.stored.document.display());

    Ok(())
}

fn print_outcome(outcome: &WipeOutcome) {
    let phase = outcome.final_phase.to_string();
    let phase = match outcome.final_phase {
        FinalPhase::Completed => phase.green().bold(),
        FinalPhase::Cancelled => phase.yellow().bold(),
        FinalPhase::Failed => phase.red().bold(),
    };

    println!("\n{}", "Sanitization Summary".bold());
    println!("{}", "=".repeat(40));
    println!("Result:   {}", phase);
    println!("Device:   {}", outcome.device.device_id);
    println!("Method:   {}", outcome.method);
    println!(
        "Passes:   {}/{}",
        outcome.pass_count, outcome.requested_passes
    );
    println!("Evidence: {} entries", outcome.pass_evidence.len());
    println!(
        "Duration: {}",
        crypto::certificates::format_wipe_duration(outcome.duration)
    );
}

fn confirm() -> Result<bool> {
    print!("\nType 'YES' to confirm: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim() == "YES")
}

fn certificate_store(settings: &Settings) -> FileCertificateStore {
    FileCertificateStore::new(&settings.certificate_dir)
}

fn show_certificate(settings: &Settings, certificate_id: &str, json: bool) -> Result<()> {
    let store = certificate_store(settings);
    if json {
        let certificate = store.load(certificate_id)?;
        println!("{}", certificate.to_json()?);
    } else {
        print!("{}", store.load_document(certificate_id)?);
    }
    Ok(())
}

fn list_certificates(settings: &Settings) -> Result<()> {
    let store = certificate_store(settings);
    let ids = store.list()?;

    if ids.is_empty() {
        println!("No certificates in {}", store.dir().display());
        return Ok(());
    }

    println!("\n{} ({})", "Issued Certificates".bold(), store.dir().display());
    println!("{}", "=".repeat(72));
    for id in ids {
        match store.load(&id) {
            Ok(cert) => println!(
                "{}  {}  {:<20} {}",
                cert.id,
                cert.issued_at.format("%Y-%m-%d %H:%M"),
                cert.device.name,
                cert.wipe.method
            ),
            Err(e) => println!("{}  {}", id, format!("unreadable: {}", e).red()),
        }
    }
    Ok(())
}

// Signal handler for graceful cancellation
fn setup_signal_handlers() -> Result<()> {
    use signal_hook::{consts::SIGINT, iterator::Signals};

    let mut signals = Signals::new([SIGINT])?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            if sig == SIGINT {
                eprintln!("\n\nInterrupt received! Cancelling sanitization...");
                eprintln!("   The current pass stops at the next safe point.");
                wipecert::set_interrupted();
            }
        }
    });

    Ok(())
}
