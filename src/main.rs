//! jarvis-transfer CLI
//!
//! Save a transfer setup once, then run it with `transfer`.

use clap::Parser;
use humansize::{format_size, BINARY};
use jarvis_transfer::config::{
    CliArgs, Commands, ConfigStore, JsonFileStore, SetupArgs, TransferDescriptor, TransferMode,
};
use jarvis_transfer::error::{Result, TransferError};
use jarvis_transfer::network::{
    FrameStyle, LanReceiver, LanSender, ProbeOutcome, RemoteTransferClient,
};
use jarvis_transfer::transfer::{probe_protocol, TransferOrchestrator, TransferOutcome};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Initialize logging; RUST_LOG wins over -v/-q
    let default_level = match (args.quiet, args.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    match run(&args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when the command ran but did not succeed
fn run(args: &CliArgs) -> Result<bool> {
    let store = match &args.config {
        Some(path) => JsonFileStore::new(path),
        None => JsonFileStore::new(JsonFileStore::default_location()?),
    };

    match &args.command {
        Commands::Setup(setup) => cmd_setup(&store, setup, args.quiet),
        Commands::Transfer {
            smb_mount_root,
            legacy_framing,
        } => cmd_transfer(&store, smb_mount_root.as_deref(), *legacy_framing, args.quiet),
        Commands::Receive {
            save_dir,
            port,
            timeout,
            legacy_framing,
            strict,
        } => cmd_receive(save_dir, *port, *timeout, *legacy_framing, *strict),
        Commands::Detect { host } => cmd_detect(host),
        Commands::ShowConfig => cmd_show_config(&store),
        Commands::Reset => cmd_reset(&store),
    }
}

fn cmd_setup(store: &JsonFileStore, setup: &SetupArgs, quiet: bool) -> Result<bool> {
    let mut descriptor = TransferDescriptor::from_setup(setup).map_err(TransferError::config)?;

    if descriptor.mode() == TransferMode::Remote && descriptor.protocol().is_none() {
        let host = descriptor.peer().unwrap_or_default().to_string();
        if !quiet {
            println!("Detecting protocol for {}...", host);
        }

        match probe_protocol(&host) {
            ProbeOutcome::Detected(protocol) => {
                if !quiet {
                    println!("Detected protocol: {}", protocol);
                }
                descriptor = descriptor.with_protocol(protocol);
            }
            ProbeOutcome::Undetermined => {
                return Err(TransferError::ProtocolUndetermined(host));
            }
        }
    }

    store.save(&descriptor)?;

    if !quiet {
        println!("Transfer setup saved to {}", store.path().display());
        print_descriptor(&descriptor);
    }

    Ok(true)
}

fn cmd_transfer(
    store: &JsonFileStore,
    smb_mount_root: Option<&Path>,
    legacy_framing: bool,
    quiet: bool,
) -> Result<bool> {
    let descriptor = store
        .load()?
        .ok_or_else(|| TransferError::config("No transfer setup found. Run 'setup' first."))?;

    let mut remote = RemoteTransferClient::new();
    if let Some(root) = smb_mount_root {
        remote = remote.with_mounted_shares(root);
    }

    let outcome = TransferOrchestrator::new()
        .with_lan_sender(LanSender::new().with_frame_style(frame_style(legacy_framing)))
        .with_remote_client(remote)
        .execute(&descriptor);

    if !quiet || !outcome.succeeded {
        print_outcome(&descriptor, &outcome);
    }

    Ok(outcome.succeeded)
}

fn cmd_receive(
    save_dir: &Path,
    port: u16,
    timeout: Option<u64>,
    legacy_framing: bool,
    strict: bool,
) -> Result<bool> {
    let mut receiver = LanReceiver::bind(&format!("0.0.0.0:{}", port))?
        .with_frame_style(frame_style(legacy_framing));
    if let Some(secs) = timeout {
        receiver = receiver.with_accept_timeout(Duration::from_secs(secs));
    }

    println!("Waiting for a file on port {} (saving to {})...", port, save_dir.display());

    let received = receiver.receive(save_dir)?;
    println!(
        "File received from {} -> {} ({})",
        received.peer,
        received.path.display(),
        format_size(received.bytes_received, BINARY)
    );

    if !received.is_complete() {
        println!(
            "Warning: sender closed early, expected {}",
            format_size(received.declared_size, BINARY)
        );
        if strict {
            received.ensure_complete()?;
        }
    }

    Ok(true)
}

fn frame_style(legacy_framing: bool) -> FrameStyle {
    if legacy_framing {
        FrameStyle::Legacy
    } else {
        FrameStyle::Line
    }
}

fn cmd_detect(host: &str) -> Result<bool> {
    match probe_protocol(host) {
        ProbeOutcome::Detected(protocol) => {
            println!("{}: {} (port {} open)", host, protocol, protocol.indicator_port());
            Ok(true)
        }
        ProbeOutcome::Undetermined => {
            println!("{}: undetermined (ports 22 and 445 closed)", host);
            Ok(false)
        }
    }
}

fn cmd_show_config(store: &JsonFileStore) -> Result<bool> {
    match store.load()? {
        Some(descriptor) => {
            println!("Saved setup ({})", store.path().display());
            print_descriptor(&descriptor);
            Ok(true)
        }
        None => {
            println!("No transfer setup saved.");
            Ok(false)
        }
    }
}

fn cmd_reset(store: &JsonFileStore) -> Result<bool> {
    if store.reset()? {
        println!("Transfer setup cleared.");
    } else {
        println!("No transfer setup to clear.");
    }
    Ok(true)
}

fn print_descriptor(descriptor: &TransferDescriptor) {
    println!("  Mode:        {}", descriptor.mode().name());
    println!("  Source:      {}", descriptor.source().display());
    if let Some(destination) = descriptor.destination() {
        println!("  Destination: {}", destination);
    }
    if let Some(peer) = descriptor.peer() {
        println!("  Host:        {}", peer);
    }
    if let Some(protocol) = descriptor.protocol() {
        println!("  Protocol:    {}", protocol);
    }
    if let Some(credentials) = descriptor.credentials() {
        println!("  Username:    {}", credentials.username);
        println!("  Password:    ********");
    }
}

fn print_outcome(descriptor: &TransferDescriptor, outcome: &TransferOutcome) {
    if outcome.succeeded {
        for attempt in &outcome.attempts {
            if let Some(error) = &attempt.error {
                println!("Transfer via {} failed: {}", attempt.protocol, error);
            }
        }

        match (descriptor.mode(), outcome.protocol_used) {
            (TransferMode::Local, _) => println!("File copied locally -> {}", outcome.resolved_path),
            (TransferMode::Network, _) => println!("File sent to {}", outcome.resolved_path),
            (TransferMode::Remote, Some(protocol)) if outcome.used_fallback() => println!(
                "File transferred via fallback {} -> {}",
                protocol, outcome.resolved_path
            ),
            (TransferMode::Remote, Some(protocol)) => {
                println!("File transferred via {} -> {}", protocol, outcome.resolved_path)
            }
            (TransferMode::Remote, None) => println!("File transferred -> {}", outcome.resolved_path),
        }
        return;
    }

    match &outcome.error {
        Some(error @ TransferError::FailoverExhausted { .. }) => {
            eprintln!("Transfer failed with both protocols");
            if let Some(causes) = error.failover_causes() {
                for (protocol, cause) in causes {
                    eprintln!("  {}: {}", protocol, cause);
                }
            }
        }
        Some(TransferError::ProtocolUndetermined(host)) => {
            eprintln!(
                "Could not detect the protocol of {}; rerun setup with --protocol sftp|smb",
                host
            );
        }
        Some(error) => eprintln!("Transfer failed: {}", error),
        None => eprintln!("Transfer failed"),
    }
}
