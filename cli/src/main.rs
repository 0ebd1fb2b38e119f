/*
    spotify-export-rs | Rust CLI tool to export playlists and Liked Songs to CSV.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use exporter_core::config::{
    plan_identities, ClientCredentials, IdentityPlan, DEFAULT_OUTPUT_DIR, DEFAULT_REDIRECT_URI,
    DEFAULT_SECRETS_FILE,
};
use exporter_core::models::LIKED_SONGS_NAME;
use exporter_core::{
    get_spotify_client, merge_directory, resolve_credentials, AuthSettings, CollectionListing,
    ExportError, ExportEvent, ExportOutcome, ExportSettings, Exporter, LibraryApi,
    SpotifyLibrary,
};
use log::debug;
use serde_json::{json, Value};
use std::env;
use std::fs::File;
use std::future::Future;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "spotify-export")]
#[command(about = "Export your Spotify playlists and Liked Songs to CSV", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Spotify Client ID (falls back to SPOTIFY_CLIENT_ID, then the secrets file)
    #[arg(long, global = true)]
    client_id: Option<String>,

    /// Spotify Client Secret (falls back to SPOTIFY_CLIENT_SECRET, then the secrets file)
    #[arg(long, global = true)]
    client_secret: Option<String>,

    #[arg(long, global = true, default_value = DEFAULT_REDIRECT_URI)]
    redirect_uri: String,

    /// key=value file holding SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET
    #[arg(long, global = true, default_value = DEFAULT_SECRETS_FILE)]
    secrets: PathBuf,

    /// Directory the CSV files are written to (and merged from)
    #[arg(long, short = 'o', global = true, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Export as this account label. Repeat to export several accounts in one run.
    #[arg(long = "user", short = 'u', global = true, value_name = "LABEL")]
    users: Vec<String>,

    /// Skip the audio features lookup (feature columns are left empty)
    #[arg(long, global = true)]
    no_features: bool,

    /// Also save the run report as JSON (e.g., --json=report.json)
    #[arg(long, global = true)]
    json: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists Liked Songs and all your playlists
    List,
    /// Exports a single playlist (or 'Liked Songs') by name. Asks for one if omitted.
    Export {
        /// Playlist name, matched case-insensitively
        #[arg(value_name = "PLAYLIST")]
        playlist: Option<String>,
        /// Output file name inside the output directory
        #[arg(long)]
        outfile: Option<String>,
    },
    /// Exports your Liked Songs
    Liked {
        #[arg(long)]
        outfile: Option<String>,
    },
    /// Exports Liked Songs and every playlist, one CSV each
    All {
        /// Leave Liked Songs out
        #[arg(long)]
        no_liked: bool,
    },
    /// Merges every CSV in the output directory into a deduplicated total_list.csv
    Merge,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    if dotenv().is_err() {
        // Silently ignore
    }

    let cli = Cli::parse();

    if let Commands::Merge = cli.command {
        handle_merge(&cli.output_dir, cli.json.as_deref());
        return;
    }

    if !run_identities(&cli).await {
        process::exit(1);
    }
}

fn resolve_client_credentials(cli: &Cli) -> anyhow::Result<ClientCredentials> {
    let client_id = cli
        .client_id
        .clone()
        .or_else(|| env::var("SPOTIFY_CLIENT_ID").ok());
    let client_secret = cli
        .client_secret
        .clone()
        .or_else(|| env::var("SPOTIFY_CLIENT_SECRET").ok());
    Ok(resolve_credentials(client_id, client_secret, &cli.secrets)?)
}

/// What running a command for every identity amounted to.
struct IdentityRun {
    completed: usize,
    total: usize,
    reports: Vec<Value>,
}

impl IdentityRun {
    fn all_completed(&self) -> bool {
        self.completed == self.total
    }
}

/// Runs `run` for each identity in turn. A failing identity is reported and
/// recorded, then the next one runs.
async fn run_each<'a, F, Fut>(plans: &'a [IdentityPlan], mut run: F) -> IdentityRun
where
    F: FnMut(&'a IdentityPlan) -> Fut,
    Fut: Future<Output = anyhow::Result<Value>>,
{
    let mut reports = Vec::with_capacity(plans.len());
    let mut completed = 0;

    for plan in plans {
        if let Some(label) = &plan.label {
            println!();
            println!("===================================================");
            println!("Account: {}", label);
            println!("===================================================");
        }

        match run(plan).await {
            Ok(report) => {
                completed += 1;
                reports.push(report);
            }
            Err(e) => {
                eprintln!();
                eprintln!("[ERROR] '{}' failed: {:#}", plan.name(), e);
                reports.push(json!({ "identity": plan.label, "error": format!("{:#}", e) }));
            }
        }
    }

    IdentityRun {
        completed,
        total: plans.len(),
        reports,
    }
}

async fn run_identities(cli: &Cli) -> bool {
    let credentials = match resolve_client_credentials(cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[ERROR] {}", e);
            return false;
        }
    };

    let auth = AuthSettings::new(credentials).with_redirect_uri(cli.redirect_uri.clone());
    let export = ExportSettings {
        output_dir: cli.output_dir.clone(),
        fetch_features: !cli.no_features,
        ..Default::default()
    };
    let plans = plan_identities(&cli.users, auth, export);

    let mut run = run_each(&plans, |plan| run_identity(&cli.command, plan)).await;

    if run.total > 1 {
        println!();
        println!("Completed {}/{} identities.", run.completed, run.total);
    }

    if let Some(path) = &cli.json {
        let report = if run.total == 1 {
            run.reports.pop().unwrap_or(Value::Null)
        } else {
            Value::Array(std::mem::take(&mut run.reports))
        };
        save_report(path, &report);
    }

    run.all_completed()
}

async fn run_identity(command: &Commands, identity: &IdentityPlan) -> anyhow::Result<Value> {
    debug!(
        "Using token cache {}",
        identity.auth.token_cache_path.display()
    );
    let spotify = get_spotify_client(&identity.auth)
        .await
        .context("Error initializing Spotify client")?;
    let exporter = Exporter::new(SpotifyLibrary::new(spotify), identity.export.clone());

    let mut report = json!({ "identity": identity.label });

    if let Some(label) = &identity.label {
        let check = exporter.check_identity(label).await?;
        if !check.matches {
            println!(
                "[WARNING] Requested '{}' but authenticated as '{}' ({}). Continuing anyway.",
                label,
                check.user_id,
                check.display_name.as_deref().unwrap_or("no display name")
            );
            println!("          Delete the token cache for this label to sign in again.");
        }
        report["identity_check"] = serde_json::to_value(&check)?;
    }

    report["result"] = match command {
        Commands::List => handle_list(&exporter).await?,
        Commands::Export { playlist, outfile } => {
            handle_export(&exporter, playlist.as_deref(), outfile.as_deref()).await?
        }
        Commands::Liked { outfile } => {
            handle_export(&exporter, Some(LIKED_SONGS_NAME), outfile.as_deref()).await?
        }
        Commands::All { no_liked } => handle_all(&exporter, !no_liked).await?,
        Commands::Merge => bail!("merge works on local files and needs no Spotify session"),
    };

    Ok(report)
}

fn print_listing(listing: &CollectionListing) {
    println!();
    println!("Available collections:");
    println!(
        "  1. {} ({} tracks) [Special Collection]",
        LIKED_SONGS_NAME, listing.liked_songs_count
    );
    for (i, playlist) in listing.playlists.iter().enumerate() {
        println!("  {}. {}", i + 2, playlist);
    }
}

async fn handle_list<A: LibraryApi>(exporter: &Exporter<A>) -> anyhow::Result<Value> {
    println!("Fetching your playlists...");

    let listing = exporter
        .list_collections()
        .await
        .context("Failed to list playlists")?;
    print_listing(&listing);
    println!();
    println!("Tip: run 'spotify-export export \"<name>\"' to export one of them");

    Ok(serde_json::to_value(&listing)?)
}

fn prompt(message: &str) -> anyhow::Result<String> {
    print!("{}", message);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn handle_export<A: LibraryApi>(
    exporter: &Exporter<A>,
    playlist: Option<&str>,
    outfile: Option<&str>,
) -> anyhow::Result<Value> {
    let name = match playlist {
        Some(name) => name.to_string(),
        None => {
            let listing = exporter
                .list_collections()
                .await
                .context("Failed to list playlists")?;
            print_listing(&listing);
            println!();
            prompt("Enter the name of the playlist to export: ")?
        }
    };
    if name.is_empty() {
        bail!("No playlist name given");
    }

    println!("Exporting '{}' ...", name);

    match exporter.export_collection(&name, outfile).await {
        Ok(ExportOutcome::Written { path, tracks }) => {
            println!();
            println!("[SAVED] Exported {} tracks to: {}", tracks, path.display());
            Ok(json!({ "collection": name, "path": path, "tracks": tracks }))
        }
        Ok(ExportOutcome::Empty) => {
            println!();
            println!("[SKIPPED] '{}' has no exportable tracks. Nothing written.", name);
            Ok(json!({ "collection": name, "path": Value::Null, "tracks": 0 }))
        }
        Err(ExportError::CollectionNotFound { name, available }) => {
            eprintln!();
            eprintln!("Playlist '{}' not found. Available collections:", name);
            for candidate in &available {
                eprintln!("   - {}", candidate);
            }
            bail!("Playlist '{}' not found", name)
        }
        Err(e) => Err(anyhow::Error::new(e).context(format!("Export of '{}' failed", name))),
    }
}

async fn handle_all<A: LibraryApi>(
    exporter: &Exporter<A>,
    include_liked: bool,
) -> anyhow::Result<Value> {
    println!("Exporting all collections...");
    println!("This fetches every playlist and its audio features. Please wait.");

    let summary = exporter
        .export_all(include_liked, |event| match event {
            ExportEvent::Started { index, total, name } => {
                println!("[{}/{}] {}", index, total, name)
            }
            ExportEvent::Written { path, tracks, .. } => {
                println!("   [SAVED] {} tracks -> {}", tracks, path.display())
            }
            ExportEvent::Empty { .. } => println!("   [SKIPPED] no exportable tracks"),
            ExportEvent::Failed { error, .. } => eprintln!("   [ERROR] {}", error),
        })
        .await
        .context("Failed to list playlists")?;

    println!();
    println!("---------------------------------------------------");
    println!("EXPORT REPORT");
    println!("---------------------------------------------------");
    println!("Collections:     {}", summary.attempted);
    println!("Exported:        {}", summary.succeeded);
    println!("Failed:          {}", summary.failures.len());
    println!("---------------------------------------------------");

    if !summary.failures.is_empty() {
        println!();
        println!("The following collections could not be exported:");
        for (i, failure) in summary.failures.iter().enumerate() {
            println!("{}. {}: {}", i + 1, failure.name, failure.error);
        }
    }

    if summary.nothing_exported() {
        bail!(
            "None of the {} collections could be exported",
            summary.attempted
        );
    }

    Ok(serde_json::to_value(&summary)?)
}

fn handle_merge(output_dir: &Path, json_path: Option<&Path>) {
    println!("Merging CSV exports in {} ...", output_dir.display());

    match merge_directory(output_dir) {
        Ok(summary) => {
            println!();
            println!("---------------------------------------------------");
            println!("MERGE REPORT");
            println!("---------------------------------------------------");
            println!("Files merged:    {}", summary.source_files.len());
            println!("Unique tracks:   {}", summary.unique_tracks);
            println!("Output:          {}", summary.output.display());
            println!("---------------------------------------------------");

            if let Some(path) = json_path {
                save_report(path, &summary);
            }
        }
        Err(e) => {
            eprintln!();
            eprintln!("[ERROR] Merge failed: {}", e);
            process::exit(1);
        }
    }
}

fn save_report<T: serde::Serialize + ?Sized>(path: &Path, report: &T) {
    match File::create(path) {
        Ok(mut file) => {
            let json_content = serde_json::to_string_pretty(report).unwrap_or_default();
            if let Err(e) = file.write_all(json_content.as_bytes()) {
                eprintln!();
                eprintln!("[ERROR] Failed to write report to file: {}", e);
            } else {
                println!();
                println!("[SAVED] Report saved to: {}", path.display());
            }
        }
        Err(e) => eprintln!(
            "[ERROR] Failed to create file '{}': {}",
            path.display(),
            e
        ),
    }
}
