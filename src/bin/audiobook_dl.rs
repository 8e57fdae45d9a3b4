#![forbid(unsafe_code)]

//! Command line front end. A list of audiobooks lives in a CSV file; the
//! subcommands edit it, look up YouTube metadata for it and turn it into a
//! yt-dlp download script.

use anyhow::{Context, Result, bail};
use audiobook_dl::{
    collection::{Collection, CollectionStore},
    config::{self, Settings},
    csv_codec,
    oembed::{MetadataFetcher, OEmbedFetcher},
    reconcile::{
        BatchState, Choice, Choices, ConflictArbiter, EditOutcome, KeepCurrent, MetadataConflict,
        PreferFetched, Reconciler,
    },
    record::{Record, RecordField, RecordId, RecordPatch},
    script::{CookieSource, FilenameTemplate, ScriptGenerator, Selection, select_valid},
    transform::TextCase,
    youtube::{self, ThumbnailQuality},
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{debug, info, warn};
use std::{
    fs,
    io::{self, BufRead, IsTerminal, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Build yt-dlp download lists for audiobooks hosted on YouTube."
)]
struct Cli {
    #[arg(
        long = "config",
        value_name = "PATH",
        global = true,
        help = "Path to the settings file"
    )]
    config: Option<PathBuf>,
    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Print the canonical watch URL of each input
    Normalize {
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,
        #[arg(long, value_enum, help = "Also print the thumbnail URL")]
        thumbnail: Option<ThumbnailQuality>,
    },
    /// Look up the title and channel of a video
    Fetch {
        #[arg(value_name = "URL")]
        url: String,
    },
    /// Show the records of a list and what each one is missing
    List {
        #[arg(value_name = "LIST")]
        list: PathBuf,
        #[arg(long, help = "Print the records as JSON")]
        json: bool,
    },
    /// Convert a spreadsheet export into a list file
    Import {
        #[arg(value_name = "CSV")]
        source: PathBuf,
        #[arg(short, long, value_name = "LIST")]
        output: PathBuf,
        #[arg(long, help = "The first row holds data, not column labels")]
        no_header: bool,
        #[arg(long, value_name = "N", help = "Minimum number of cells per row")]
        columns: Option<usize>,
    },
    /// Change a list: add, remove, clone or edit records
    Edit {
        #[arg(value_name = "LIST")]
        list: PathBuf,
        #[arg(long, value_enum, default_value_t = Resolve::Ask)]
        resolve: Resolve,
        #[command(subcommand)]
        edit: EditAction,
    },
    /// Fill empty titles and authors from YouTube
    Fill {
        #[arg(value_name = "LIST")]
        list: PathBuf,
        #[arg(
            long,
            help = "Check every record and settle disagreements instead of only filling blanks"
        )]
        interactive: bool,
        #[arg(long, value_enum, default_value_t = Resolve::Ask)]
        resolve: Resolve,
    },
    /// Write a bash script that downloads every complete record
    Script {
        #[arg(value_name = "LIST")]
        list: PathBuf,
        #[command(flatten)]
        options: ScriptOptions,
        #[arg(short, long, value_name = "PATH", help = "Write to a file instead of stdout")]
        output: Option<PathBuf>,
    },
    /// Print every download chained into one command line
    Command {
        #[arg(value_name = "LIST")]
        list: PathBuf,
        #[command(flatten)]
        options: ScriptOptions,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum EditAction {
    /// Append a blank record
    Add,
    /// Remove the record at ROW
    Remove { row: usize },
    /// Append a copy of the record at ROW, without its URL
    Clone { row: usize },
    /// Set one field; setting the URL looks up the video
    Set {
        row: usize,
        field: RecordField,
        value: String,
    },
    /// Change the letter case of one field
    Case {
        row: usize,
        field: RecordField,
        #[arg(value_enum)]
        case: TextCase,
    },
    /// Replace the whole list with one blank record
    Reset,
}

#[derive(Args, Debug, Clone, Default)]
struct ScriptOptions {
    #[arg(long, value_name = "TEMPLATE", help = "Output filename template")]
    template: Option<String>,
    #[arg(long, value_enum, help = "Browser to borrow cookies from")]
    cookies_browser: Option<CookieSource>,
    #[arg(long, help = "Refuse to generate anything if a record is incomplete")]
    strict: bool,
}

/// How conflicting metadata is settled.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Resolve {
    /// Ask on the terminal; keeps current values when not interactive
    #[default]
    Ask,
    Current,
    Fetched,
}

impl Resolve {
    fn arbiter(self) -> Box<dyn ConflictArbiter> {
        match self {
            Resolve::Ask if io::stdin().is_terminal() => Box::new(PromptArbiter),
            Resolve::Ask => {
                debug!("stdin is not a terminal; keeping current values on conflict");
                Box::new(KeepCurrent)
            }
            Resolve::Current => Box::new(KeepCurrent),
            Resolve::Fetched => Box::new(PreferFetched),
        }
    }
}

/// URL edit waiting for the lookup flow.
#[derive(Debug, Clone, PartialEq, Eq)]
struct UrlEdit {
    id: RecordId,
    row: usize,
    value: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => config::load_settings_from(path)?,
        None => config::load_settings()?,
    };

    match cli.action {
        Action::Normalize { urls, thumbnail } => normalize_urls(&urls, thumbnail),
        Action::Fetch { url } => fetch_one(&settings, &url).await,
        Action::List { list, json } => list_records(&list, json),
        Action::Import {
            source,
            output,
            no_header,
            columns,
        } => import_csv(&settings, &source, &output, no_header, columns),
        Action::Edit { list, resolve, edit } => edit_list(&settings, &list, &edit, resolve).await,
        Action::Fill {
            list,
            interactive,
            resolve,
        } => fill_list(&settings, &list, interactive, resolve).await,
        Action::Script {
            list,
            options,
            output,
        } => write_script(&settings, &list, &options, output.as_deref()),
        Action::Command { list, options } => print_command(&settings, &list, &options),
    }
}

fn normalize_urls(urls: &[String], thumbnail: Option<ThumbnailQuality>) -> Result<()> {
    let mut rejected = 0usize;
    for raw in urls {
        match youtube::normalize_str(raw) {
            Some(canonical) => {
                println!("{canonical}");
                if let Some(quality) = thumbnail {
                    println!("{}", youtube::thumbnail_url(canonical.video_id(), quality));
                }
            }
            None => {
                eprintln!("{raw}: not a YouTube video URL");
                rejected += 1;
            }
        }
    }
    if rejected > 0 {
        bail!("{rejected} of {} input(s) could not be normalized", urls.len());
    }
    Ok(())
}

fn make_reconciler(settings: &Settings) -> Reconciler {
    let fetcher: Arc<dyn MetadataFetcher> = Arc::new(OEmbedFetcher::new(
        settings.oembed_endpoint.clone(),
        settings.http_timeout,
    ));
    Reconciler::new(fetcher, settings.reconcile_options())
}

async fn fetch_one(settings: &Settings, url: &str) -> Result<()> {
    let Some(canonical) = youtube::normalize_str(url) else {
        bail!("{url} is not a YouTube video URL");
    };
    let metadata = make_reconciler(settings)
        .fetch(&canonical)
        .await
        .with_context(|| format!("Looking up {canonical}"))?;
    println!("URL:     {canonical}");
    println!("Title:   {}", metadata.title);
    println!("Channel: {}", metadata.author_name);
    Ok(())
}

fn list_records(list: &Path, json: bool) -> Result<()> {
    let collection = load_collection(list)?;
    if json {
        let rendered = serde_json::to_string_pretty(collection.records())
            .context("Serializing records")?;
        println!("{rendered}");
        return Ok(());
    }
    for (index, record) in collection.records().iter().enumerate() {
        let heading = record
            .heading()
            .unwrap_or_else(|| "(untitled)".to_string());
        println!("{:>3}. {heading}", index + 1);
        if !record.url.trim().is_empty() {
            println!("     {}", record.url);
        }
        let problems: Vec<String> = record
            .validate()
            .iter()
            .map(|error| error.to_string())
            .collect();
        if !problems.is_empty() && !record.is_blank() {
            println!("     missing: {}", problems.join(", "));
        }
    }
    let selection = select_valid(collection.records());
    println!(
        "{} record(s), {} ready to download, {} incomplete",
        collection.len(),
        selection.valid.len(),
        selection.invalid.len()
    );
    Ok(())
}

fn import_csv(
    settings: &Settings,
    source: &Path,
    output: &Path,
    no_header: bool,
    columns: Option<usize>,
) -> Result<()> {
    let text =
        fs::read_to_string(source).with_context(|| format!("Reading {}", source.display()))?;
    let has_header = settings.csv_has_header && !no_header;
    let expected = columns.unwrap_or(settings.csv_expected_columns);
    let records = csv_codec::decode(&text, has_header, expected);
    if records.is_empty() {
        warn!("{} contained no usable rows", source.display());
    }
    let imported = records.len();
    save_collection(output, &Collection::from_records(records))?;
    println!("Imported {imported} record(s) into {}", output.display());
    Ok(())
}

async fn edit_list(
    settings: &Settings,
    list: &Path,
    edit: &EditAction,
    resolve: Resolve,
) -> Result<()> {
    let store = CollectionStore::new(load_or_new(list)?);
    if let Some(url_edit) = apply_edit(&store, edit)? {
        let reconciler = make_reconciler(settings);
        let snapshot = store.snapshot();
        let record = snapshot
            .get(url_edit.id)
            .context("Record disappeared while editing")?;
        let mut session = reconciler.session(record);
        session.url_changed(&store, &url_edit.value);
        let arbiter = resolve.arbiter();
        match reconciler
            .settle(&mut session, &store, arbiter.as_ref())
            .await
        {
            Ok(EditOutcome::Skipped) => {
                if youtube::normalize_str(&url_edit.value).is_none() {
                    eprintln!("Row {}: URL saved, but it is not a YouTube video", url_edit.row);
                }
            }
            Ok(outcome) => report_outcome(url_edit.row, &outcome),
            Err(err) => eprintln!("Row {}: metadata lookup failed: {err}", url_edit.row),
        }
    }
    save_collection(list, &store.snapshot())
}

/// Applies everything except URL changes, which are handed back so the
/// caller can run the lookup flow.
fn apply_edit(store: &CollectionStore, edit: &EditAction) -> Result<Option<UrlEdit>> {
    let snapshot = store.snapshot();
    match edit {
        EditAction::Add => {
            store.modify(Collection::add);
        }
        EditAction::Remove { row } => {
            let id = row_id(&snapshot, *row)?;
            store.modify(|collection| collection.remove(id));
        }
        EditAction::Clone { row } => {
            let id = row_id(&snapshot, *row)?;
            store.modify(|collection| collection.clone_record(id));
        }
        EditAction::Set {
            row,
            field: RecordField::Url,
            value,
        } => {
            let value = youtube::normalize_str(value)
                .map(|canonical| canonical.watch_url().to_owned())
                .unwrap_or_else(|| value.clone());
            return Ok(Some(UrlEdit {
                id: row_id(&snapshot, *row)?,
                row: *row,
                value,
            }));
        }
        EditAction::Set { row, field, value } => {
            let id = row_id(&snapshot, *row)?;
            let patch = RecordPatch::from_text(*field, value);
            store.modify(|collection| collection.update(id, &patch));
        }
        EditAction::Case { row, field, case } => {
            let id = row_id(&snapshot, *row)?;
            let current = snapshot
                .get(id)
                .map(|record| record.field_value(*field))
                .unwrap_or_default();
            let patch = RecordPatch::from_text(*field, &case.apply(&current));
            store.modify(|collection| collection.update(id, &patch));
        }
        EditAction::Reset => {
            store.modify(Collection::reset);
        }
    }
    Ok(None)
}

async fn fill_list(
    settings: &Settings,
    list: &Path,
    interactive: bool,
    resolve: Resolve,
) -> Result<()> {
    let store = CollectionStore::new(load_collection(list)?);
    let reconciler = make_reconciler(settings);

    if interactive {
        let arbiter = resolve.arbiter();
        let ids: Vec<RecordId> = store.snapshot().records().iter().map(|r| r.id).collect();
        let mut looked_up = false;
        for (index, id) in ids.into_iter().enumerate() {
            let has_video = store
                .snapshot()
                .get(id)
                .and_then(|record| youtube::normalize_str(&record.url))
                .is_some();
            if !has_video {
                continue;
            }
            if looked_up {
                tokio::time::sleep(settings.batch_delay).await;
            }
            looked_up = true;
            match reconciler
                .reconcile_record(&store, id, arbiter.as_ref())
                .await
            {
                Ok(outcome) => report_outcome(index + 1, &outcome),
                Err(err) => eprintln!("Row {}: metadata lookup failed: {err}", index + 1),
            }
        }
    } else {
        let mut state = BatchState::default();
        loop {
            let report = reconciler.run_batch(&store, &mut state).await;
            let snapshot = store.snapshot();
            let row = |id: RecordId| snapshot.position(id).map(|pos| pos + 1).unwrap_or(0);
            for id in &report.filled {
                println!("Row {}: filled from YouTube", row(*id));
            }
            for (id, err) in &report.failed {
                eprintln!("Row {}: metadata lookup failed: {err}", row(*id));
            }
            for id in &report.exhausted {
                eprintln!("Row {}: giving up after repeated failures", row(*id));
            }
            if report.failed.is_empty() || report.lookups() == 0 {
                break;
            }
            info!("retrying {} failed lookup(s)", report.failed.len());
            tokio::time::sleep(settings.batch_delay).await;
        }
    }

    save_collection(list, &store.snapshot())
}

fn report_outcome(row: usize, outcome: &EditOutcome) {
    match outcome {
        EditOutcome::Skipped => debug!("row {row}: nothing to look up"),
        EditOutcome::Stale => println!("Row {row}: URL changed during lookup, result dropped"),
        EditOutcome::Unchanged => println!("Row {row}: already matches YouTube"),
        EditOutcome::Filled(_) => println!("Row {row}: filled from YouTube"),
        EditOutcome::Arbitrated {
            conflicts, choices, ..
        } => {
            let adopted = conflicts
                .iter()
                .filter(|conflict| choices.get(conflict.field) == Choice::Fetched)
                .count();
            println!(
                "Row {row}: {adopted} of {} disagreement(s) taken from YouTube",
                conflicts.len()
            );
        }
    }
}

fn script_generator(settings: &Settings, options: &ScriptOptions) -> ScriptGenerator {
    let template = options
        .template
        .clone()
        .map(FilenameTemplate::new)
        .unwrap_or_else(|| settings.filename_template.clone());
    let cookies = options.cookies_browser.unwrap_or(settings.cookies);
    ScriptGenerator::new(template, cookies)
}

/// Reports incomplete records and enforces `--strict`.
fn check_selection(selection: &Selection<'_>, strict: bool) -> Result<()> {
    for invalid in &selection.invalid {
        let reasons: Vec<String> = invalid.errors.iter().map(|e| e.to_string()).collect();
        eprintln!("Row {} skipped: {}", invalid.index + 1, reasons.join(", "));
    }
    if strict && !selection.invalid.is_empty() {
        bail!(
            "{} record(s) incomplete; nothing generated",
            selection.invalid.len()
        );
    }
    Ok(())
}

fn write_script(
    settings: &Settings,
    list: &Path,
    options: &ScriptOptions,
    output: Option<&Path>,
) -> Result<()> {
    let collection = load_collection(list)?;
    let selection = select_valid(collection.records());
    check_selection(&selection, options.strict)?;
    let script = script_generator(settings, options)
        .script(collection.records())
        .context("Generating download script")?;

    match output {
        Some(path) => {
            fs::write(path, &script).with_context(|| format!("Writing {}", path.display()))?;
            make_executable(path)?;
            println!(
                "Wrote {} download(s) to {}",
                selection.valid.len(),
                path.display()
            );
        }
        None => print!("{script}"),
    }
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)
        .with_context(|| format!("Reading metadata for {}", path.display()))?
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)
        .with_context(|| format!("Setting permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

fn print_command(settings: &Settings, list: &Path, options: &ScriptOptions) -> Result<()> {
    let collection = load_collection(list)?;
    check_selection(&select_valid(collection.records()), options.strict)?;
    let command = script_generator(settings, options)
        .command(collection.records())
        .context("Generating download command")?;
    println!("{command}");
    Ok(())
}

/// Id of the record at a one-based row.
fn row_id(collection: &Collection, row: usize) -> Result<RecordId> {
    row.checked_sub(1)
        .and_then(|index| collection.id_at(index))
        .with_context(|| {
            format!(
                "Row {row} does not exist (the list has {} row(s))",
                collection.len()
            )
        })
}

fn load_collection(path: &Path) -> Result<Collection> {
    let text = fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let columns = csv_codec::default_columns();
    let records = csv_codec::decode(&text, true, columns.len());
    debug!("loaded {} record(s) from {}", records.len(), path.display());
    Ok(Collection::from_records(records))
}

fn load_or_new(path: &Path) -> Result<Collection> {
    if !path.exists() {
        info!("{} does not exist yet; starting a new list", path.display());
        return Ok(Collection::default());
    }
    load_collection(path)
}

fn save_collection(path: &Path, collection: &Collection) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("Creating {}", parent.display()))?;
    }
    let text = csv_codec::encode(collection.records(), &csv_codec::default_columns())
        .with_context(|| format!("Encoding {}", path.display()))?;
    fs::write(path, text).with_context(|| format!("Writing {}", path.display()))
}

/// Asks about each conflict on the terminal. Unanswerable prompts keep the
/// current value.
struct PromptArbiter;

impl ConflictArbiter for PromptArbiter {
    fn choose(&self, record: &Record, conflicts: &[MetadataConflict]) -> Choices {
        let label = record.heading().unwrap_or_else(|| record.url.clone());
        println!("YouTube disagrees with \"{label}\":");
        let mut choices = Choices::default();
        let mut input = io::stdin().lock();
        let mut output = io::stdout().lock();
        for conflict in conflicts {
            match ask_choice(&mut input, &mut output, conflict) {
                Ok(choice) => choices.set(conflict.field, choice),
                Err(err) => {
                    warn!("{err:#}; keeping current values");
                    break;
                }
            }
        }
        choices
    }
}

/// Shows one conflict and reads which side to keep. An empty answer or end of
/// input keeps the current value.
fn ask_choice<R, W>(input: &mut R, output: &mut W, conflict: &MetadataConflict) -> Result<Choice>
where
    R: BufRead,
    W: Write,
{
    writeln!(
        output,
        "  {}: yours \"{}\", YouTube \"{}\"",
        conflict.field, conflict.current_value, conflict.fetched_value
    )?;
    loop {
        write!(output, "  Keep [c]urrent or take [f]etched {}? [C/f] ", conflict.field)?;
        output.flush()?;
        let mut answer = String::new();
        if input
            .read_line(&mut answer)
            .context("Reading conflict answer")?
            == 0
        {
            return Ok(Choice::Current);
        }
        match answer.trim().to_lowercase().as_str() {
            "" | "c" | "current" => return Ok(Choice::Current),
            "f" | "fetched" | "youtube" => return Ok(Choice::Fetched),
            other => writeln!(output, "  `{other}` is neither c nor f.")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audiobook_dl::reconcile::ConflictField;
    use tempfile::tempdir;

    fn titled(title: &str) -> Record {
        Record {
            title: title.into(),
            ..Record::empty()
        }
    }

    #[test]
    fn parses_nested_edit_commands() {
        let cli = Cli::try_parse_from([
            "audiobook-dl",
            "edit",
            "--resolve",
            "fetched",
            "books.csv",
            "set",
            "2",
            "series-number",
            "3",
        ])
        .unwrap();
        match cli.action {
            Action::Edit { list, resolve, edit } => {
                assert_eq!(list, PathBuf::from("books.csv"));
                assert_eq!(resolve, Resolve::Fetched);
                assert_eq!(
                    edit,
                    EditAction::Set {
                        row: 2,
                        field: RecordField::SeriesNumber,
                        value: "3".into(),
                    }
                );
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn parses_script_options() {
        let cli = Cli::try_parse_from([
            "audiobook-dl",
            "script",
            "books.csv",
            "--cookies-browser",
            "firefox",
            "--strict",
            "-o",
            "get.sh",
        ])
        .unwrap();
        let Action::Script {
            options, output, ..
        } = cli.action
        else {
            panic!("expected script action");
        };
        assert_eq!(options.cookies_browser, Some(CookieSource::Firefox));
        assert!(options.strict);
        assert_eq!(output, Some(PathBuf::from("get.sh")));

        assert!(Cli::try_parse_from(["audiobook-dl", "edit", "x.csv", "set", "1", "isbn", "1"]).is_err());
    }

    #[test]
    fn row_ids_are_one_based() {
        let collection = Collection::from_records(vec![titled("a"), titled("b")]);
        assert_eq!(row_id(&collection, 2).unwrap(), collection.records()[1].id);
        assert!(row_id(&collection, 0).is_err());
        assert!(row_id(&collection, 3).is_err());
    }

    #[test]
    fn apply_edit_handles_plain_fields_and_defers_urls() {
        let store = CollectionStore::new(Collection::from_records(vec![titled("the hobbit")]));
        let id = store.snapshot().records()[0].id;

        let edit = EditAction::Case {
            row: 1,
            field: RecordField::Title,
            case: TextCase::Name,
        };
        assert_eq!(apply_edit(&store, &edit).unwrap(), None);
        assert_eq!(store.snapshot().get(id).unwrap().title, "The Hobbit");

        let edit = EditAction::Set {
            row: 1,
            field: RecordField::Year,
            value: "1937".into(),
        };
        apply_edit(&store, &edit).unwrap();
        assert_eq!(store.snapshot().get(id).unwrap().year, Some(1937));

        let edit = EditAction::Set {
            row: 1,
            field: RecordField::Url,
            value: "https://youtu.be/dQw4w9WgXcQ".into(),
        };
        let deferred = apply_edit(&store, &edit).unwrap().unwrap();
        assert_eq!(deferred.id, id);
        assert_eq!(deferred.value, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert!(store.snapshot().get(id).unwrap().url.is_empty());

        apply_edit(&store, &EditAction::Clone { row: 1 }).unwrap();
        apply_edit(&store, &EditAction::Remove { row: 1 }).unwrap();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.records()[0].title, "The Hobbit");
        assert_ne!(snapshot.records()[0].id, id);

        assert!(apply_edit(&store, &EditAction::Remove { row: 5 }).is_err());
    }

    #[test]
    fn url_edits_keep_raw_text_that_is_not_a_video() {
        let store = CollectionStore::default();
        let edit = EditAction::Set {
            row: 1,
            field: RecordField::Url,
            value: "youtube.com/watch?v=dQw".into(),
        };
        let deferred = apply_edit(&store, &edit).unwrap().unwrap();
        assert_eq!(deferred.value, "youtube.com/watch?v=dQw");
    }

    #[test]
    fn conflict_answers_pick_a_side() {
        let conflict = MetadataConflict {
            field: ConflictField::Title,
            current_value: "Foo".into(),
            fetched_value: "Bar".into(),
        };
        let ask = |answers: &str| {
            let mut output = Vec::new();
            let choice = ask_choice(&mut answers.as_bytes(), &mut output, &conflict).unwrap();
            (choice, String::from_utf8(output).unwrap())
        };

        let (choice, shown) = ask("f\n");
        assert_eq!(choice, Choice::Fetched);
        assert!(shown.contains("title: yours \"Foo\", YouTube \"Bar\""));

        assert_eq!(ask("\n").0, Choice::Current);
        assert_eq!(ask("").0, Choice::Current);

        let (choice, shown) = ask("maybe\nFetched\n");
        assert_eq!(choice, Choice::Fetched);
        assert!(shown.contains("`maybe` is neither c nor f."));
    }

    #[test]
    fn multiline_titles_stay_in_the_list() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("books.csv");
        let store = CollectionStore::new(Collection::from_records(vec![titled("x"), titled("y")]));
        let edit = EditAction::Set {
            row: 1,
            field: RecordField::Title,
            value: "a\nb".into(),
        };
        apply_edit(&store, &edit).unwrap();
        save_collection(&path, &store.snapshot()).unwrap();

        let loaded = load_collection(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.records()[0].title, "a\nb");
        assert_eq!(loaded.records()[1].title, "y");
    }

    #[test]
    fn lists_survive_a_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lists").join("books.csv");
        let collection = Collection::from_records(vec![
            Record {
                url: "https://youtu.be/dQw4w9WgXcQ".into(),
                author: "Last, First".into(),
                ..titled("One")
            },
            titled("Two"),
        ]);
        save_collection(&path, &collection).unwrap();

        let loaded = load_collection(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.records()[0].author, "Last, First");
        assert_eq!(loaded.records()[1].title, "Two");

        assert_eq!(load_or_new(&dir.path().join("missing.csv")).unwrap().len(), 1);
        assert!(load_collection(&dir.path().join("missing.csv")).is_err());
    }

    #[test]
    fn strict_mode_refuses_incomplete_lists() {
        let records = vec![
            Record {
                url: "https://youtu.be/dQw4w9WgXcQ".into(),
                author: "A".into(),
                narrator: "N".into(),
                ..titled("T")
            },
            titled("no url"),
        ];
        let selection = select_valid(&records);
        assert!(check_selection(&selection, false).is_ok());
        assert!(check_selection(&selection, true).is_err());
    }

    #[test]
    fn cli_overrides_configured_template_and_cookies() {
        let settings = Settings::default();
        let options = ScriptOptions {
            template: Some("$title".into()),
            cookies_browser: Some(CookieSource::Brave),
            strict: false,
        };
        let generator = script_generator(&settings, &options);
        assert_eq!(generator.template().as_str(), "$title");
        assert_eq!(generator.cookies(), CookieSource::Brave);

        let generator = script_generator(&settings, &ScriptOptions::default());
        assert_eq!(generator.template(), &FilenameTemplate::default());
        assert_eq!(generator.cookies(), CookieSource::None);
    }
}
