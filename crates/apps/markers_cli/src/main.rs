use std::env;
use std::error::Error;
use std::fmt::Write as _;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use markers::{
    FileSurface, MarkerId, MarkerStore, PersistenceSurface, StoreConfig, DEFAULT_STORAGE_KEY,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Manage saved globe markers")]
struct Args {
    /// Directory holding marker snapshots (default: $MARKERS_DIR or data/markers)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Storage key of the snapshot (default: $MARKERS_KEY or userMarkers)
    #[arg(long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List markers in insertion order
    List {
        /// Print the collection as JSON
        #[arg(long)]
        json: bool,
    },

    /// Place a new marker
    Add {
        /// Longitude in degrees, -180..=180
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,

        /// Latitude in degrees, -90..=90
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long)]
        label: Option<String>,

        #[arg(long)]
        note: Option<String>,
    },

    /// Replace a marker's note (truncated to 500 characters)
    Note { id: String, text: String },

    /// Replace a marker's label
    Rename { id: String, label: String },

    /// Delete a marker; unknown ids are ignored
    Delete { id: String },

    /// Delete every marker
    Clear,

    /// Print the raw stored snapshot
    Export,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let data_dir = args.data_dir.unwrap_or_else(|| {
        env::var("MARKERS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/markers"))
    });
    let key = args.key.unwrap_or_else(|| {
        env::var("MARKERS_KEY").unwrap_or_else(|_| DEFAULT_STORAGE_KEY.to_string())
    });

    info!("marker snapshots in {data_dir:?} under key {key}");
    let config = StoreConfig::default().with_storage_key(key);
    let mut store = MarkerStore::open(FileSurface::new(data_dir), config);

    let out = run(&mut store, args.command)?;
    if store.has_pending_write() {
        warn!("snapshot write still pending, retrying");
        store.flush()?;
    }
    print!("{out}");
    Ok(())
}

fn run<S: PersistenceSurface>(
    store: &mut MarkerStore<S>,
    command: Command,
) -> Result<String, Box<dyn Error>> {
    let mut out = String::new();
    match command {
        Command::List { json } => {
            if json {
                out = serde_json::to_string_pretty(store.list())?;
                out.push('\n');
            } else {
                for m in store.list() {
                    let _ = writeln!(
                        out,
                        "{}\t{:.6}\t{:.6}\t{}\t{}",
                        m.id, m.lng, m.lat, m.label, m.note
                    );
                }
            }
        }
        Command::Add {
            lng,
            lat,
            label,
            note,
        } => {
            let m = store.add(lng, lat, label.as_deref(), note.as_deref())?;
            let _ = writeln!(out, "{}", m.id);
        }
        Command::Note { id, text } => {
            let m = store.update_note(&MarkerId::new(id), &text)?;
            let _ = writeln!(out, "{}\t{}", m.id, m.note);
        }
        Command::Rename { id, label } => {
            let m = store.rename(&MarkerId::new(id), &label)?;
            let _ = writeln!(out, "{}\t{}", m.id, m.label);
        }
        Command::Delete { id } => {
            let removed = store.delete(&MarkerId::new(id.as_str()))?;
            if !removed {
                warn!("no marker with id {id}");
            }
            let _ = writeln!(out, "{}", if removed { "deleted" } else { "not found" });
        }
        Command::Clear => {
            let count = store.clear()?;
            let _ = writeln!(out, "cleared {count}");
        }
        Command::Export => {
            let raw = store.surface().read(&store.config().storage_key)?;
            out = raw.unwrap_or_else(|| "[]".to_string());
            out.push('\n');
        }
    }
    Ok(out)
}
