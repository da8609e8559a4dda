use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use memo_core::config::DataConfig;
use memo_core::progress::{deck_progress, overall};
use memo_core::study_log::{read_entries, recent_daily_counts};
use memo_core::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "memo")]
#[command(about = "Spaced-repetition flashcards in the terminal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Review the cards that are due (default)
    Review {
        /// Only review cards from this deck
        #[arg(long)]
        deck: Option<String>,

        /// Review bookmarked cards instead of due cards
        #[arg(long)]
        bookmarked: bool,

        /// Seed for the queue order
        #[arg(long)]
        seed: Option<u64>,

        /// Scripted answers (comma-separated grades 0-5), for non-interactive use
        #[arg(long, value_delimiter = ',')]
        grades: Option<Vec<i64>>,
    },

    /// Add a card, creating its deck if needed
    Add {
        #[arg(long)]
        deck: String,
        #[arg(long)]
        front: String,
        #[arg(long)]
        back: String,
        #[arg(long)]
        tag: Option<String>,
    },

    /// List cards
    List {
        #[arg(long)]
        deck: Option<String>,

        /// Only cards that are due now
        #[arg(long)]
        due: bool,
    },

    /// Change the text of a card
    Edit {
        id: Uuid,
        #[arg(long)]
        front: Option<String>,
        #[arg(long)]
        back: Option<String>,
        #[arg(long, conflicts_with = "clear_tag")]
        tag: Option<String>,

        /// Remove the card's tag
        #[arg(long)]
        clear_tag: bool,
    },

    /// Delete a card
    Delete { id: Uuid },

    /// Toggle the bookmark on a card
    Bookmark { id: Uuid },

    /// Show due and done counts per deck
    Progress,

    /// Show cards reviewed per day
    History {
        #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u32).range(1..=3660))]
        days: u32,
    },

    /// Create, rename and delete decks
    Deck {
        #[command(subcommand)]
        action: DeckAction,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum DeckAction {
    /// Create an empty deck
    Add {
        name: String,
        #[arg(long)]
        tag: Option<String>,
    },

    /// Rename a deck, moving its cards
    Rename { from: String, to: String },

    /// Delete a deck together with all of its cards
    Delete { name: String },

    /// List decks with their tags and card counts
    List,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the current settings to the config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Print the config file path
    Path,
}

fn main() -> Result<()> {
    memo_core::logging::init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(data_dir) = cli.data_dir {
        config.data = DataConfig { data_dir };
    }
    let data = config.data.clone();
    tracing::debug!("Using data directory {:?}", data.data_dir);

    match cli.command {
        Some(Commands::Review {
            deck,
            bookmarked,
            seed,
            grades,
        }) => cmd_review(
            &data,
            deck,
            bookmarked,
            seed.or(config.review.shuffle_seed),
            grades,
        ),
        Some(Commands::Add {
            deck,
            front,
            back,
            tag,
        }) => cmd_add(&data, deck, front, back, tag),
        Some(Commands::List { deck, due }) => cmd_list(&data, deck, due),
        Some(Commands::Edit {
            id,
            front,
            back,
            tag,
            clear_tag,
        }) => {
            let tag = if clear_tag { Some(None) } else { tag.map(Some) };
            cmd_edit(&data, id, front, back, tag)
        }
        Some(Commands::Delete { id }) => cmd_delete(&data, id),
        Some(Commands::Bookmark { id }) => cmd_bookmark(&data, id),
        Some(Commands::Progress) => cmd_progress(&data),
        Some(Commands::History { days }) => cmd_history(&data, days),
        Some(Commands::Deck { action }) => cmd_deck(&data, action),
        Some(Commands::Config { action }) => cmd_config(&config, action),
        None => cmd_review(&data, None, false, config.review.shuffle_seed, None),
    }
}

fn cmd_review(
    data: &DataConfig,
    deck: Option<String>,
    bookmarked: bool,
    seed: Option<u64>,
    grades: Option<Vec<i64>>,
) -> Result<()> {
    let mut store = JsonCardStore::new(data.cards_path());
    let mut log = JsonlStudyLog::new(data.study_log_path()).for_deck(deck.clone());

    let mut spec = if bookmarked {
        QueueSpec::bookmarked()
    } else {
        QueueSpec::due()
    };
    spec.deck = deck;

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    // Validate scripted grades up front
    let mut scripted = match grades {
        Some(raw) => Some(
            raw.into_iter()
                .map(Grade::new)
                .collect::<Result<Vec<_>>>()?
                .into_iter(),
        ),
        None => None,
    };

    let mut session = ReviewSession::start(&store, &spec, Utc::now(), &mut rng, &mut log)?;
    if session.is_complete() {
        println!("No cards to review.");
    }

    let stdin = io::stdin();
    let mut input = stdin.lock();

    while !session.is_complete() {
        match session.state() {
            SessionState::Question { .. } => {
                let (position, total) = session.progress();
                let card = current_card(&session)?;
                println!("\n[{}/{}] {}", position, total, card.deck);
                println!("  Q: {}", card.front);

                if scripted.is_none() {
                    match prompt(&mut input, "Enter to show answer, 'q' to quit")? {
                        Some(line) if line.eq_ignore_ascii_case("q") => break,
                        Some(_) => {}
                        None => break,
                    }
                }
                session.reveal()?;
            }

            SessionState::Answer { .. } => {
                let card = current_card(&session)?;
                println!("  A: {}", card.back);

                let grade = match scripted.as_mut() {
                    Some(answers) => match answers.next() {
                        Some(grade) => grade,
                        None => break,
                    },
                    None => match prompt_grade(&mut input)? {
                        Some(grade) => grade,
                        None => break,
                    },
                };

                match session.grade(grade, Utc::now(), &mut store, &mut log) {
                    Ok(outcome) => report_outcome(&outcome),
                    // Still in Grading: offer retry or skip
                    Err(e) if scripted.is_none() && is_grading(&session) => {
                        eprintln!("Could not save this card: {}", e);
                    }
                    Err(e) => return Err(e),
                }
            }

            SessionState::Grading { .. } => {
                match prompt(&mut input, "'r' to retry saving, 's' to skip this card")? {
                    Some(line) if line.eq_ignore_ascii_case("s") => session.skip(&mut log)?,
                    Some(_) => match session.retry(Utc::now(), &mut store, &mut log) {
                        Ok(outcome) => report_outcome(&outcome),
                        Err(e) if is_grading(&session) => {
                            eprintln!("Could not save this card: {}", e);
                        }
                        Err(e) => return Err(e),
                    },
                    None => break,
                }
            }

            state => {
                return Err(Error::State(format!("unexpected review state: {}", state)));
            }
        }
    }

    if let Some(e) = log.take_failure() {
        return Err(e);
    }

    if session.is_complete() {
        println!("\n✓ Session complete: {} cards reviewed", session.reviewed());
    } else {
        let (position, total) = session.progress();
        println!(
            "\nSession abandoned at card {}/{} ({} reviewed)",
            position,
            total,
            session.reviewed()
        );
    }

    Ok(())
}

fn is_grading(session: &ReviewSession) -> bool {
    matches!(session.state(), SessionState::Grading { .. })
}

fn current_card(session: &ReviewSession) -> Result<&Flashcard> {
    session
        .current()
        .ok_or_else(|| Error::State(format!("no card for state {}", session.state())))
}

fn report_outcome(outcome: &GradeOutcome) {
    match outcome {
        GradeOutcome::Scheduled { memory, .. } => {
            println!("  → next review in {}", format_interval(memory.interval));
        }
        GradeOutcome::Missing { card_id } => {
            println!("  ! Card {} was deleted, skipping", card_id);
        }
    }
}

fn format_interval(days: f64) -> String {
    if days >= 1.0 {
        let days = days.round() as i64;
        if days == 1 {
            "1 day".to_string()
        } else {
            format!("{} days", days)
        }
    } else {
        let seconds = (days * 86_400.0).round().max(1.0) as i64;
        if seconds < 60 {
            format!("{}s", seconds)
        } else if seconds < 3600 {
            format!("{}m", seconds / 60)
        } else {
            format!("{}h", seconds / 3600)
        }
    }
}

fn prompt(input: &mut impl BufRead, message: &str) -> Result<Option<String>> {
    print!("{}\n> ", message);
    io::stdout().flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn prompt_grade(input: &mut impl BufRead) -> Result<Option<Grade>> {
    loop {
        let Some(line) = prompt(input, "'a' again, 'g' good, 'e' easy (or a grade 0-5)")? else {
            return Ok(None);
        };
        match parse_grade(&line) {
            Ok(grade) => return Ok(Some(grade)),
            Err(e) => eprintln!("{}", e),
        }
    }
}

fn parse_grade(input: &str) -> Result<Grade> {
    match input.to_lowercase().as_str() {
        "a" | "again" => Ok(ReviewAction::Again.grade()),
        "g" | "good" => Ok(ReviewAction::Good.grade()),
        "e" | "easy" => Ok(ReviewAction::Easy.grade()),
        other => other
            .parse::<i64>()
            .map_err(|_| Error::Other(format!("Unknown answer: {}", other)))
            .and_then(Grade::new),
    }
}

fn cmd_add(
    data: &DataConfig,
    deck: String,
    front: String,
    back: String,
    tag: Option<String>,
) -> Result<()> {
    let store = JsonCardStore::new(data.cards_path());
    let now = Utc::now();

    let id = store.update(|doc| {
        doc.ensure_deck(&deck, now)?;
        doc.add_card(Flashcard::new(deck.trim(), front, back, tag, now))
    })?;

    println!("✓ Added card {}", id);
    Ok(())
}

fn cmd_list(data: &DataConfig, deck: Option<String>, due: bool) -> Result<()> {
    let store = JsonCardStore::new(data.cards_path());
    let document = store.load()?;
    let now = Utc::now();

    let mut cards: Vec<_> = document
        .cards
        .values()
        .filter(|c| deck.as_ref().map_or(true, |d| &c.deck == d))
        .filter(|c| !due || c.is_due(now))
        .collect();
    cards.sort_by(|a, b| (&a.deck, a.created_at).cmp(&(&b.deck, b.created_at)));

    if cards.is_empty() {
        println!("No cards.");
        return Ok(());
    }

    for card in cards {
        let when = if card.is_due(now) {
            "due".to_string()
        } else {
            card.memory
                .next_review_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        };
        println!(
            "{}  [{}]{} {}  ({}, rep {}, ease {:.2})",
            card.id,
            card.deck,
            if card.bookmarked { " ★" } else { "" },
            card.front,
            when,
            card.memory.repetition,
            card.memory.ease_factor
        );
    }
    Ok(())
}

fn cmd_edit(
    data: &DataConfig,
    id: Uuid,
    front: Option<String>,
    back: Option<String>,
    tag: Option<Option<String>>,
) -> Result<()> {
    let store = JsonCardStore::new(data.cards_path());
    store.update(|doc| doc.edit_card(id, front, back, tag).map(|_| ()))?;
    println!("✓ Updated card {}", id);
    Ok(())
}

fn cmd_delete(data: &DataConfig, id: Uuid) -> Result<()> {
    let store = JsonCardStore::new(data.cards_path());
    let card = store.update(|doc| doc.remove_card(id))?;
    println!("✓ Deleted card {} ({})", id, card.front);
    Ok(())
}

fn cmd_bookmark(data: &DataConfig, id: Uuid) -> Result<()> {
    let store = JsonCardStore::new(data.cards_path());
    let bookmarked = store.update(|doc| doc.toggle_bookmark(id))?;
    if bookmarked {
        println!("✓ Bookmarked card {}", id);
    } else {
        println!("✓ Removed bookmark from card {}", id);
    }
    Ok(())
}

fn cmd_progress(data: &DataConfig) -> Result<()> {
    let store = JsonCardStore::new(data.cards_path());
    let document = store.load()?;

    let rows = deck_progress(
        document.decks.keys().map(String::as_str),
        document.cards.values(),
        Utc::now(),
    );
    if rows.is_empty() {
        println!("No decks.");
        return Ok(());
    }

    let total = overall(&rows);
    for row in rows.iter().chain(std::iter::once(&total)) {
        println!(
            "{:<20} {:>5} / {:<5} done  {:>3}%  ({} due)",
            row.deck,
            row.done(),
            row.total,
            row.percent(),
            row.due
        );
    }
    Ok(())
}

fn cmd_history(data: &DataConfig, days: u32) -> Result<()> {
    let entries = read_entries(&data.study_log_path())?;
    let now = Local::now();

    for (day, count) in recent_daily_counts(&entries, now.date_naive(), days, *now.offset()) {
        println!("{}  {:>4}", day.format("%m/%d"), count);
    }
    Ok(())
}

fn cmd_deck(data: &DataConfig, action: DeckAction) -> Result<()> {
    let store = JsonCardStore::new(data.cards_path());

    match action {
        DeckAction::Add { name, tag } => {
            let now = Utc::now();
            let name = store.update(|doc| doc.add_deck(&name, tag, now).map(|d| d.name.clone()))?;
            println!("✓ Created deck {}", name);
        }
        DeckAction::Rename { from, to } => {
            let to = store.update(|doc| doc.rename_deck(&from, &to).map(|d| d.name.clone()))?;
            println!("✓ Renamed deck {} to {}", from, to);
        }
        DeckAction::Delete { name } => {
            let removed = store.update(|doc| doc.remove_deck(&name))?;
            println!("✓ Deleted deck {} ({} cards)", name, removed);
        }
        DeckAction::List => {
            let document = store.load()?;
            if document.decks.is_empty() {
                println!("No decks.");
            }
            for deck in document.decks.values() {
                println!(
                    "{:<20} {:>5} cards  {}",
                    deck.name,
                    document.cards_in_deck(&deck.name).count(),
                    deck.tag.as_deref().unwrap_or("")
                );
            }
        }
    }
    Ok(())
}

fn cmd_config(config: &Config, action: ConfigAction) -> Result<()> {
    let path = Config::default_config_path()
        .ok_or_else(|| Error::Config("no config directory available".into()))?;

    match action {
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                return Err(Error::Config(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )));
            }
            config.save()?;
            println!("✓ Wrote {}", path.display());
        }
        ConfigAction::Path => println!("{}", path.display()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grade_actions_and_numbers() {
        assert_eq!(parse_grade("a").unwrap().value(), 1);
        assert_eq!(parse_grade("Good").unwrap().value(), 4);
        assert_eq!(parse_grade("e").unwrap().value(), 5);
        assert_eq!(parse_grade("0").unwrap().value(), 0);
        assert!(matches!(parse_grade("6"), Err(Error::InvalidGrade(6))));
        assert!(parse_grade("maybe").is_err());
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(0.0001), "9s");
        assert_eq!(format_interval(1.0), "1 day");
        assert_eq!(format_interval(6.0), "6 days");
        assert_eq!(format_interval(0.5), "12h");
    }
}
