use anyhow::{Context, Result, anyhow, bail};
use lesson_marks_config::{Config, RestoreConfig};
use lesson_marks_engine::{
    Document, HighlightColor, JsonFileRepository, LessonEvent, LessonSession, NoteId, NoteScope,
    NoticeLevel, RestoreSettings,
};
use std::time::Instant;
use std::{env, path::Path, process};

const USAGE: &str = "Usage: lesson-marks-cli <lesson.md> <command> [args] [--user <id>]

Commands:
  render                          print the lesson with highlights as HTML
  list                            list notes in display order
  highlight <text> [--color <c>] [--note <text>]
  note <text>                     add a note without a highlight
  edit <id> <text>                replace a note's content
  color <id> <color>              recolor a note's highlight
  unhighlight <id>                drop the highlight, keep the note
  delete <id>                     delete a note and its highlights
  merge <source-id> <target-id>   fold one note into another
  focus <id>                      flash a note's highlight and print it
  locate <text>                   show the anchor a selection of <text> gets

Note ids may be shortened to any unique prefix.";

type Session = LessonSession<JsonFileRepository>;

fn settings_from(restore: &RestoreConfig) -> RestoreSettings {
    RestoreSettings {
        settle_delay: restore.settle_delay(),
        focus_retry_delays: restore.focus_retry_delays(),
        flash_duration: restore.flash_duration(),
        strict_source_match: restore.strict_source_match,
    }
}

/// Pull `--name value` out of the argument list
fn take_flag(args: &mut Vec<String>, name: &str) -> Result<Option<String>> {
    let Some(index) = args.iter().position(|arg| arg == name) else {
        return Ok(None);
    };
    if index + 1 >= args.len() {
        bail!("{name} needs a value");
    }
    let value = args.remove(index + 1);
    args.remove(index);
    Ok(Some(value))
}

fn arg<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing {what}\n\n{USAGE}"))
}

fn resolve_id(session: &Session, prefix: &str) -> Result<NoteId> {
    let matches: Vec<&NoteId> = session
        .notes()
        .iter()
        .map(|note| &note.id)
        .filter(|id| id.as_str().starts_with(prefix))
        .collect();
    match matches.as_slice() {
        [id] => Ok((*id).clone()),
        [] => bail!("no note matches '{prefix}'"),
        _ => bail!("'{prefix}' matches {} notes", matches.len()),
    }
}

fn wait_until(deadline: Instant) {
    let now = Instant::now();
    if deadline > now {
        std::thread::sleep(deadline - now);
    }
}

/// Run the session until restoration and any pending flash have finished
fn settle(session: &mut Session) {
    while let Some(deadline) = session.next_deadline() {
        wait_until(deadline);
        session.tick(Instant::now());
    }
}

/// Tick until a focus request lands on a marker or runs out of retries
fn await_focus(session: &mut Session) -> Result<()> {
    while let Some(deadline) = session.next_deadline() {
        wait_until(deadline);
        let outcome = session.tick(Instant::now());
        if outcome.focused.is_some() {
            println!("{}", session.document().to_html());
            return Ok(());
        }
        if let Some(id) = outcome.abandoned {
            bail!("note {id} has no highlight to focus");
        }
    }
    Ok(())
}

/// First eight characters of an id, for listings
fn short_id(id: &NoteId) -> String {
    id.as_str().chars().take(8).collect()
}

fn print_notes(session: &Session) {
    if session.notes().is_empty() {
        println!("No notes for this lesson");
        return;
    }
    for (index, note) in session.notes().iter().enumerate() {
        let highlight = match note.primary_anchor() {
            Some(anchor) => format!("[{}] \"{}\"", anchor.color, anchor.source_text),
            None => "(no highlight)".to_string(),
        };
        let extras = match note.extra_highlights.len() {
            0 => String::new(),
            n => format!(" +{n} merged"),
        };
        println!(
            "{:>3}. {} {}{}",
            index + 1,
            short_id(&note.id),
            highlight,
            extras
        );
        if !note.content.is_empty() {
            for line in note.content.lines() {
                println!("       {line}");
            }
        }
    }
}

fn run(session: &mut Session, command: &str, mut args: Vec<String>) -> Result<()> {
    match command {
        "render" => println!("{}", session.document().to_html()),
        "list" => print_notes(session),
        "highlight" => {
            let color = match take_flag(&mut args, "--color")? {
                Some(color) => color.parse::<HighlightColor>()?,
                None => HighlightColor::default(),
            };
            let content = take_flag(&mut args, "--note")?.unwrap_or_default();
            let text = arg(&args, 0, "text to highlight")?;
            let span = session
                .locate(text)
                .ok_or_else(|| anyhow!("'{text}' does not appear in the lesson"))?;
            let note = session.create_highlight(&span, color, content)?;
            println!("Created highlight {}", note.id);
        }
        "note" => {
            let note = session.create_plain_note(arg(&args, 0, "note text")?)?;
            println!("Created note {}", note.id);
        }
        "edit" => {
            let id = resolve_id(session, arg(&args, 0, "note id")?)?;
            session.edit_content(&id, arg(&args, 1, "note text")?)?;
        }
        "color" => {
            let id = resolve_id(session, arg(&args, 0, "note id")?)?;
            let color = arg(&args, 1, "color")?.parse::<HighlightColor>()?;
            session.change_color(&id, color)?;
        }
        "unhighlight" => {
            let id = resolve_id(session, arg(&args, 0, "note id")?)?;
            session.remove_highlight(&id)?;
        }
        "delete" => {
            let id = resolve_id(session, arg(&args, 0, "note id")?)?;
            session.delete_note(&id)?;
            println!("Deleted note {id}");
        }
        "merge" => {
            let source = resolve_id(session, arg(&args, 0, "source note id")?)?;
            let target = resolve_id(session, arg(&args, 1, "target note id")?)?;
            let outcome = session.merge(&source, &target)?;
            println!(
                "Merged into {} ({} highlight(s) moved)",
                outcome.target.id, outcome.retagged
            );
        }
        "focus" => {
            let id = resolve_id(session, arg(&args, 0, "note id")?)?;
            session.focus(id, Instant::now());
            await_focus(session)?;
        }
        "locate" => {
            let text = arg(&args, 0, "text to locate")?;
            let shape = session
                .locate(text)
                .and_then(|span| session.document().encode_selection(&span))
                .ok_or_else(|| anyhow!("'{text}' does not appear in the lesson"))?;
            println!("start: {} @ {}", shape.start_path, shape.start_offset);
            println!("end:   {} @ {}", shape.end_path, shape.end_offset);
        }
        other => bail!("unknown command '{other}'\n\n{USAGE}"),
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let user_flag = take_flag(&mut args, "--user")?;
    if args.len() < 2 {
        eprintln!("{USAGE}");
        process::exit(1);
    }

    let config = match Config::load() {
        Ok(Some(config)) => config,
        Ok(None) => {
            log::info!(
                "No config at {}, using defaults",
                Config::config_path().display()
            );
            Config::default()
        }
        Err(e) => {
            eprintln!("Error: Failed to load config file: {e}");
            process::exit(1);
        }
    };

    let user = user_flag.unwrap_or_else(|| config.user.clone());
    let lesson_path = Path::new(&args[0]).to_path_buf();
    let command = args[1].clone();
    let rest = args.split_off(2);

    let markdown = std::fs::read_to_string(&lesson_path)
        .with_context(|| format!("reading lesson {}", lesson_path.display()))?;
    let lesson_id = lesson_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("lesson path has no file name"))?;
    log::info!(
        "Lesson '{lesson_id}' for user '{user}', notes in {}",
        config.notes_path.display()
    );

    let mut session = LessonSession::new(
        JsonFileRepository::new(&config.notes_path),
        NoteScope::new(user, lesson_id),
        Document::from_markdown(&markdown),
        settings_from(&config.restore),
    );

    session.events().subscribe(|event| match event {
        LessonEvent::Notice(notice) if notice.level == NoticeLevel::Error => {
            eprintln!("Error: {}", notice.message)
        }
        LessonEvent::Notice(notice) => println!("{}", notice.message),
        LessonEvent::Restored(report) if !report.orphaned.is_empty() => {
            for (id, slot) in &report.orphaned {
                log::warn!("Highlight {slot} of note {id} no longer matches the lesson");
            }
        }
        LessonEvent::HighlightFocused { note_id, .. } => log::info!("Focused note {note_id}"),
        _ => {}
    });

    session.open(Instant::now())?;
    settle(&mut session);

    let result = run(&mut session, &command, rest);
    session.close();

    if !session.store().pending_reconciliation().is_empty() {
        eprintln!("Some changes could not be saved; they will be reloaded next time");
    }
    result
}
