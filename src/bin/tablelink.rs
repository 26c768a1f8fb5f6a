//! CLI for tablelink - inspect workbooks, render tables and keep a JSON document in sync
//!
//! Usage:
//!   tablelink sheets book.xlsx
//!   tablelink render book.xlsx Sheet1 A1:D9 -o layout.json
//!   tablelink insert drawing.json book.xlsx Sheet1 Prices --x 100 --y 50
//!   tablelink watch drawing.json

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{error, info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::Instant;

use tablelink::commands::{apply_attributes, insert_new, relink, update_selected, InsertRequest};
use tablelink::config::Settings;
use tablelink::sync::FixedPrompt;
use tablelink::{
    layout, ChangePrompt, DefinitionIndex, DocumentStore, HorizontalOverride, LinkUpdater,
    MemoryDocument, PlacementId, RenderOptions, SourceInspector, StandardNormalizer,
    SyncCoordinator, SyncDecision, TableNormalizer, TableReader, Transform, UnitSystem,
    UpdateOutcome, VAlign, XlsxSource,
};

#[derive(Parser)]
#[command(name = "tablelink")]
#[command(about = "Render spreadsheet ranges as linked vector tables and keep them in sync")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to <config dir>/tablelink/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log pipeline details
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the worksheets of a workbook
    Sheets { file: PathBuf },

    /// Print the used range of a worksheet
    UsedRange { file: PathBuf, sheet: String },

    /// Lay out a range and print the geometry as JSON
    Render {
        file: PathBuf,
        sheet: String,
        /// A1 range or defined name
        range: String,
        #[command(flatten)]
        render: RenderArgs,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Insert a new linked table into a document
    Insert {
        document: PathBuf,
        file: PathBuf,
        sheet: String,
        range: String,
        #[command(flatten)]
        render: RenderArgs,
        #[arg(long, default_value_t = 0.0)]
        x: f64,
        #[arg(long, default_value_t = 0.0)]
        y: f64,
    },

    /// Regenerate linked definitions from their sources
    Update {
        document: PathBuf,
        /// Definition indices; every linked definition when omitted
        #[arg(long = "index", short = 'i')]
        indices: Vec<usize>,
        /// Grow each range to the sheet's used range first
        #[arg(long)]
        extend: bool,
    },

    /// Copy link attributes edited on a placement to its definition and regenerate
    ApplyAttributes { document: PathBuf, placement: u64 },

    /// Point a definition at another source given as <file>|<sheet>|<range>
    Relink {
        document: PathBuf,
        index: usize,
        spec: String,
    },

    /// Poll linked sources and regenerate on change
    Watch {
        document: PathBuf,
        /// Do not ask; use the configured extend policy
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum AlignArg {
    Source,
    Left,
    Center,
    Right,
}

#[derive(Clone, Copy, ValueEnum)]
enum VAlignArg {
    Top,
    Middle,
    Bottom,
}

/// Render overrides layered over the configured defaults.
#[derive(Args)]
struct RenderArgs {
    #[arg(long)]
    scale: Option<f64>,
    #[arg(long, value_enum)]
    align: Option<AlignArg>,
    #[arg(long, value_enum)]
    valign: Option<VAlignArg>,
    /// Text height in millimeters
    #[arg(long)]
    text_height: Option<f64>,
    #[arg(long)]
    font: Option<String>,
    /// Host text style name
    #[arg(long)]
    style: Option<String>,
    #[arg(long)]
    wrap: bool,
    #[arg(long)]
    no_grid: bool,
}

impl RenderArgs {
    fn apply(&self, mut options: RenderOptions) -> RenderOptions {
        if let Some(scale) = self.scale {
            options.scale_multiplier = scale;
        }
        if let Some(align) = self.align {
            options.horizontal_override = match align {
                AlignArg::Source => HorizontalOverride::UseSource,
                AlignArg::Left => HorizontalOverride::Left,
                AlignArg::Center => HorizontalOverride::Center,
                AlignArg::Right => HorizontalOverride::Right,
            };
        }
        if let Some(valign) = self.valign {
            options.vertical_align = match valign {
                VAlignArg::Top => VAlign::Top,
                VAlignArg::Middle => VAlign::Middle,
                VAlignArg::Bottom => VAlign::Bottom,
            };
        }
        if self.text_height.is_some() {
            options.override_text_height_mm = self.text_height;
        }
        if self.font.is_some() {
            options.font_family_override.clone_from(&self.font);
        }
        if self.style.is_some() {
            options.style_name_override.clone_from(&self.style);
        }
        options.enable_wrap |= self.wrap;
        options.draw_grid &= !self.no_grid;
        options
    }
}

/// Reads Yes/No/Cancel from stdin: yes extends ranges, no updates in place.
struct StdinPrompt;

impl ChangePrompt for StdinPrompt {
    fn confirm(&mut self, path: &Path, affected: usize) -> SyncDecision {
        print!(
            "{} changed ({affected} linked table(s)). Extend ranges to the used range? [y]es/[n]o/[c]ancel: ",
            path.display()
        );
        if io::stdout().flush().is_err() {
            return SyncDecision::Cancel;
        }
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return SyncDecision::Cancel;
        }
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => SyncDecision::UpdateAndExtend,
            "n" | "no" => SyncDecision::Update,
            _ => SyncDecision::Cancel,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if TermLogger::init(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto).is_err() {
        eprintln!("tablelink: logger already initialized");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> tablelink::Result<()> {
    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::load_default()?,
    };
    let updater = LinkUpdater::new(XlsxSource::new(), StandardNormalizer);

    match cli.command {
        Command::Sheets { file } => {
            for name in updater.reader().list_sheet_names(&file)? {
                println!("{name}");
            }
        }
        Command::UsedRange { file, sheet } => {
            match updater.reader().used_range_of(&file, &sheet)? {
                Some(range) => println!("{range}"),
                None => println!("(empty)"),
            }
        }
        Command::Render {
            file,
            sheet,
            range,
            render,
            output,
        } => {
            let options = render.apply(settings.render.clone());
            let model = StandardNormalizer.normalize(updater.reader().read_table(
                &file,
                &sheet,
                &range,
            )?);
            let geometry = layout(&model, &options, settings.units)?;
            let json = serde_json::to_string_pretty(&geometry)?;
            match output {
                Some(path) => std::fs::write(path, json)?,
                None => println!("{json}"),
            }
        }
        Command::Insert {
            document,
            file,
            sheet,
            range,
            render,
            x,
            y,
        } => {
            let mut doc = open_document(&document, settings.units)?;
            let mut sync = SyncCoordinator::new(settings.sync.debounce());
            let request = InsertRequest {
                source_path: std::path::absolute(&file)?,
                sheet_name: sheet,
                range_spec: range,
                options: render.apply(settings.render.clone()),
                at: Transform::translation(x, y),
            };
            let inserted = insert_new(&mut doc, &mut sync, &updater, &request)?;
            doc.save(&document)?;
            println!("{} {} {}", inserted.index, inserted.name, inserted.placement);
        }
        Command::Update {
            document,
            indices,
            extend,
        } => {
            let mut doc = MemoryDocument::load(&document)?;
            let mut sync = SyncCoordinator::new(settings.sync.debounce());
            sync.register_document(&doc);
            let selection: Vec<DefinitionIndex> = if indices.is_empty() {
                doc.definitions()
            } else {
                indices.into_iter().map(DefinitionIndex).collect()
            };
            let report = update_selected(&mut doc, &mut sync, &updater, &selection, extend);
            doc.save(&document)?;
            println!("{}", report.summary());
        }
        Command::ApplyAttributes {
            document,
            placement,
        } => {
            let mut doc = MemoryDocument::load(&document)?;
            let mut sync = SyncCoordinator::new(settings.sync.debounce());
            sync.register_document(&doc);
            match apply_attributes(&mut doc, &mut sync, &updater, PlacementId(placement))? {
                UpdateOutcome::Updated { old, new, .. } => println!("{old} -> {new}"),
                UpdateOutcome::Skipped(reason) => println!("skipped: {reason}"),
            }
            doc.save(&document)?;
        }
        Command::Relink {
            document,
            index,
            spec,
        } => {
            let mut doc = MemoryDocument::load(&document)?;
            let mut sync = SyncCoordinator::new(settings.sync.debounce());
            sync.register_document(&doc);
            relink(&mut doc, &mut sync, DefinitionIndex(index), &spec)?;
            doc.save(&document)?;
        }
        Command::Watch { document, yes } => {
            let mut doc = MemoryDocument::load(&document)?;
            let mut sync = SyncCoordinator::new(settings.sync.debounce());
            if sync.register_document(&doc) == 0 {
                info!("no linked tables in {}", document.display());
                return Ok(());
            }
            let mut prompt: Box<dyn ChangePrompt> = if yes {
                Box::new(FixedPrompt(settings.sync.default_decision()))
            } else {
                Box::new(StdinPrompt)
            };
            watch(&mut doc, &document, &mut sync, &updater, prompt.as_mut(), &settings)?;
        }
    }
    Ok(())
}

fn open_document(path: &Path, units: UnitSystem) -> tablelink::Result<MemoryDocument> {
    if path.exists() {
        MemoryDocument::load(path)
    } else {
        Ok(MemoryDocument::new(units))
    }
}

fn watch<R, N>(
    doc: &mut MemoryDocument,
    document: &Path,
    sync: &mut SyncCoordinator,
    updater: &LinkUpdater<R, N>,
    prompt: &mut dyn ChangePrompt,
    settings: &Settings,
) -> tablelink::Result<()>
where
    R: TableReader + SourceInspector,
    N: TableNormalizer,
{
    info!(
        "watching {} source(s), polling every {:?}",
        sync.watched_paths().len(),
        settings.sync.poll_interval()
    );
    loop {
        for path in sync.scan() {
            let report = sync.handle_change(doc, updater, prompt, &path, Instant::now());
            if let Some(report) = report {
                for (index, err) in &report.failed {
                    error!("{index}: {err}");
                }
                doc.save(document)?;
            }
        }
        thread::sleep(settings.sync.poll_interval());
    }
}
