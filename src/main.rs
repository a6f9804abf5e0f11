use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use wanicache::{
  AssignmentFilters, BasicFilters, CacheStore, Client, Config, NewReview, RateLimiter,
  ReviewFilters, ReviewStatisticFilters, ReviewTarget, StudyMaterialFilters, StudyMaterialUpdate,
  SubjectFilters, UserPreferences,
};

#[derive(Parser, Debug)]
#[command(name = "wanicache")]
#[command(about = "A caching command-line client for the WaniKani v2 API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/wanicache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show the lesson/review summary report
  Summary,
  /// Show the user profile
  User,
  /// List assignments
  Assignments {
    #[arg(long, value_delimiter = ',')]
    ids: Option<Vec<u64>>,
    #[arg(long)]
    burned: Option<bool>,
    #[arg(long)]
    started: Option<bool>,
    #[arg(long)]
    unlocked: Option<bool>,
    #[arg(long)]
    hidden: Option<bool>,
    #[arg(long, value_delimiter = ',')]
    levels: Option<Vec<u32>>,
    #[arg(long, value_delimiter = ',')]
    srs_stages: Option<Vec<u32>>,
    #[arg(long, value_delimiter = ',')]
    subject_ids: Option<Vec<u64>>,
    #[arg(long, value_delimiter = ',')]
    subject_types: Option<Vec<String>>,
    /// Only assignments whose subjects are ready for review right now
    #[arg(long)]
    in_review: bool,
    #[arg(long)]
    updated_after: Option<String>,
  },
  /// List subjects
  Subjects {
    #[arg(long, value_delimiter = ',')]
    types: Option<Vec<String>>,
    #[arg(long, value_delimiter = ',')]
    levels: Option<Vec<u32>>,
    #[arg(long, value_delimiter = ',')]
    ids: Option<Vec<u64>>,
    #[arg(long, value_delimiter = ',')]
    slugs: Option<Vec<String>>,
    #[arg(long)]
    hidden: Option<bool>,
    #[arg(long)]
    updated_after: Option<String>,
  },
  /// List reviews
  Reviews {
    #[arg(long, value_delimiter = ',')]
    ids: Option<Vec<u64>>,
    #[arg(long, value_delimiter = ',')]
    assignment_ids: Option<Vec<u64>>,
    #[arg(long, value_delimiter = ',')]
    subject_ids: Option<Vec<u64>>,
    #[arg(long)]
    updated_after: Option<String>,
  },
  /// List review statistics
  ReviewStatistics {
    #[arg(long, value_delimiter = ',')]
    ids: Option<Vec<u64>>,
    #[arg(long)]
    hidden: Option<bool>,
    #[arg(long)]
    percentages_greater_than: Option<u32>,
    #[arg(long)]
    percentages_less_than: Option<u32>,
    #[arg(long, value_delimiter = ',')]
    subject_ids: Option<Vec<u64>>,
    #[arg(long, value_delimiter = ',')]
    subject_types: Option<Vec<String>>,
    #[arg(long)]
    updated_after: Option<String>,
  },
  /// List study materials
  StudyMaterials {
    #[arg(long, value_delimiter = ',')]
    ids: Option<Vec<u64>>,
    #[arg(long)]
    hidden: Option<bool>,
    #[arg(long, value_delimiter = ',')]
    subject_ids: Option<Vec<u64>>,
    #[arg(long, value_delimiter = ',')]
    subject_types: Option<Vec<String>>,
    #[arg(long)]
    updated_after: Option<String>,
  },
  /// List level progressions
  LevelProgressions {
    #[arg(long, value_delimiter = ',')]
    ids: Option<Vec<u64>>,
    #[arg(long)]
    updated_after: Option<String>,
  },
  /// List resets
  Resets {
    #[arg(long, value_delimiter = ',')]
    ids: Option<Vec<u64>>,
    #[arg(long)]
    updated_after: Option<String>,
  },
  /// List spaced repetition systems
  SrsSystems {
    #[arg(long, value_delimiter = ',')]
    ids: Option<Vec<u64>>,
    #[arg(long)]
    updated_after: Option<String>,
  },
  /// List voice actors
  VoiceActors {
    #[arg(long, value_delimiter = ',')]
    ids: Option<Vec<u64>>,
    #[arg(long)]
    updated_after: Option<String>,
  },
  /// Mark an assignment started
  StartAssignment {
    id: u64,
    /// Backdated start time (ISO 8601)
    #[arg(long)]
    started_at: Option<String>,
  },
  /// Record a finished review
  CreateReview {
    #[arg(long, conflicts_with = "subject_id", required_unless_present = "subject_id")]
    assignment_id: Option<u64>,
    #[arg(long)]
    subject_id: Option<u64>,
    #[arg(long, default_value_t = 0)]
    incorrect_meanings: u32,
    #[arg(long, default_value_t = 0)]
    incorrect_readings: u32,
    /// Backdated review time (ISO 8601)
    #[arg(long)]
    created_at: Option<String>,
  },
  /// Create the study material for a subject
  CreateStudyMaterial {
    subject_id: u64,
    #[arg(long)]
    meaning_note: Option<String>,
    #[arg(long)]
    reading_note: Option<String>,
    #[arg(long, value_delimiter = ',')]
    meaning_synonyms: Option<Vec<String>>,
  },
  /// Update an existing study material
  UpdateStudyMaterial {
    id: u64,
    #[arg(long)]
    meaning_note: Option<String>,
    #[arg(long)]
    reading_note: Option<String>,
    #[arg(long, value_delimiter = ',')]
    meaning_synonyms: Option<Vec<String>>,
  },
  /// Update user preferences
  UpdateUser {
    #[arg(long)]
    default_voice_actor_id: Option<u64>,
    #[arg(long)]
    lessons_autoplay_audio: Option<bool>,
    #[arg(long)]
    lessons_batch_size: Option<u32>,
    #[arg(long)]
    lessons_presentation_order: Option<String>,
    #[arg(long)]
    reviews_autoplay_audio: Option<bool>,
    #[arg(long)]
    reviews_display_srs_indicator: Option<bool>,
  },
}

fn main() -> Result<()> {
  color_eyre::install()?;

  // Logs go to stderr; stdout carries only the JSON result.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;

  let store = Arc::new(CacheStore::open(&config.cache_db_path()?)?);
  let limiter = Arc::new(Mutex::new(RateLimiter::new()));
  let client = Client::new(&config.api_token()?, &config.api_url, store, limiter)?;

  match args.command {
    Command::Summary => print(&client.summary()?),
    Command::User => print(&client.user()?),
    Command::Assignments {
      ids,
      burned,
      started,
      unlocked,
      hidden,
      levels,
      srs_stages,
      subject_ids,
      subject_types,
      in_review,
      updated_after,
    } => print(&client.assignments(&AssignmentFilters {
      ids: ids.map(Into::into),
      burned,
      started,
      unlocked,
      hidden,
      levels,
      srs_stages,
      subject_ids,
      subject_types,
      in_review,
      updated_after: updated_after.map(Into::into),
      ..Default::default()
    })?),
    Command::Subjects {
      types,
      levels,
      ids,
      slugs,
      hidden,
      updated_after,
    } => print(&client.subjects(&SubjectFilters {
      types,
      levels,
      ids: ids.map(Into::into),
      slugs,
      hidden,
      updated_after: updated_after.map(Into::into),
    })?),
    Command::Reviews {
      ids,
      assignment_ids,
      subject_ids,
      updated_after,
    } => print(&client.reviews(&ReviewFilters {
      ids: ids.map(Into::into),
      assignment_ids,
      subject_ids,
      updated_after: updated_after.map(Into::into),
    })?),
    Command::ReviewStatistics {
      ids,
      hidden,
      percentages_greater_than,
      percentages_less_than,
      subject_ids,
      subject_types,
      updated_after,
    } => print(&client.review_statistics(&ReviewStatisticFilters {
      ids: ids.map(Into::into),
      hidden,
      percentages_greater_than,
      percentages_less_than,
      subject_ids,
      subject_types,
      updated_after: updated_after.map(Into::into),
    })?),
    Command::StudyMaterials {
      ids,
      hidden,
      subject_ids,
      subject_types,
      updated_after,
    } => print(&client.study_materials(&StudyMaterialFilters {
      ids: ids.map(Into::into),
      hidden,
      subject_ids,
      subject_types,
      updated_after: updated_after.map(Into::into),
    })?),
    Command::LevelProgressions { ids, updated_after } => {
      print(&client.level_progressions(&basic(ids, updated_after))?)
    }
    Command::Resets { ids, updated_after } => print(&client.resets(&basic(ids, updated_after))?),
    Command::SrsSystems { ids, updated_after } => {
      print(&client.spaced_repetition_systems(&basic(ids, updated_after))?)
    }
    Command::VoiceActors { ids, updated_after } => {
      print(&client.voice_actors(&basic(ids, updated_after))?)
    }
    Command::StartAssignment { id, started_at } => {
      print(&client.start_assignment(id, started_at.map(Into::into))?)
    }
    Command::CreateReview {
      assignment_id,
      subject_id,
      incorrect_meanings,
      incorrect_readings,
      created_at,
    } => {
      let target = if let Some(id) = assignment_id {
        ReviewTarget::Assignment(id)
      } else if let Some(id) = subject_id {
        ReviewTarget::Subject(id)
      } else {
        return Err(eyre!("one of --assignment-id or --subject-id is required"));
      };
      let outcome = client.create_review(&NewReview {
        target,
        incorrect_meaning_answers: incorrect_meanings,
        incorrect_reading_answers: incorrect_readings,
        created_at: created_at.map(Into::into),
      })?;
      print(&outcome.review)
    }
    Command::CreateStudyMaterial {
      subject_id,
      meaning_note,
      reading_note,
      meaning_synonyms,
    } => print(&client.create_study_material(
      subject_id,
      &StudyMaterialUpdate {
        meaning_note,
        reading_note,
        meaning_synonyms,
      },
    )?),
    Command::UpdateStudyMaterial {
      id,
      meaning_note,
      reading_note,
      meaning_synonyms,
    } => print(&client.update_study_material(
      id,
      &StudyMaterialUpdate {
        meaning_note,
        reading_note,
        meaning_synonyms,
      },
    )?),
    Command::UpdateUser {
      default_voice_actor_id,
      lessons_autoplay_audio,
      lessons_batch_size,
      lessons_presentation_order,
      reviews_autoplay_audio,
      reviews_display_srs_indicator,
    } => print(&client.update_user(&UserPreferences {
      default_voice_actor_id,
      lessons_autoplay_audio,
      lessons_batch_size,
      lessons_presentation_order,
      reviews_autoplay_audio,
      reviews_display_srs_indicator,
    })?),
  }
}

fn basic(ids: Option<Vec<u64>>, updated_after: Option<String>) -> BasicFilters {
  BasicFilters {
    ids: ids.map(Into::into),
    updated_after: updated_after.map(Into::into),
  }
}

fn print<T: serde::Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
