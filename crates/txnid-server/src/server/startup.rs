//! Startup recovery: where issuance resumes and what gets reserved on disk
//! before the first connection is accepted.

use crate::server::config::ServerConfig;
use anyhow::{Context, bail};
use txnid::{MAX_SEED, ProgressStore, ResumePoint, TICK_OVER};

/// Loads the progress file, resolves the resume point and reserves the
/// range after it.
///
/// Until the first rollover the reservation is the only thing keeping the
/// current range from being reissued after a crash, so failing to write it
/// is fatal.
///
/// # Errors
///
/// Fails if the progress file cannot be read or parsed, if the stored seed
/// leaves no range to reserve, or if the reservation cannot be written.
pub fn prepare(config: &ServerConfig, store: &ProgressStore) -> anyhow::Result<ResumePoint> {
    let resume = resume_point(config, store)?;

    if resume.increment != config.increment {
        tracing::warn!(
            stored = resume.increment,
            configured = config.increment,
            "Progress file overrides the configured increment"
        );
    }

    store.write_partial(resume.base + 1).with_context(|| {
        format!(
            "failed to reserve the next range in {}",
            store.path().display()
        )
    })?;
    tracing::debug!(reserved = resume.base + 1, "Next range reserved");

    Ok(resume)
}

/// Resolves where issuance resumes.
///
/// A missing or empty file means a fresh start at seed 0 with the
/// configured instance and increment. Placeholders in a partial record take
/// the configured values too.
fn resume_point(config: &ServerConfig, store: &ProgressStore) -> anyhow::Result<ResumePoint> {
    let record = store
        .load()
        .with_context(|| format!("failed to load progress file {}", store.path().display()))?;

    let resume = match record {
        Some(record) => record.resolve(config.start, config.increment),
        None => ResumePoint {
            base: 0,
            counter: config.start,
            increment: config.increment,
        },
    };

    tracing::debug!(
        loaded = record.is_some(),
        instance = config.start,
        increment = config.increment,
        confdir = %config.confdir.display(),
        seed = resume.base,
        counter = resume.counter,
        resume_increment = resume.increment,
        "Resume point"
    );

    // Both are rejected by record parsing and config validation.
    debug_assert!(resume.counter < TICK_OVER);
    debug_assert!(resume.increment > 0);

    if resume.base >= MAX_SEED {
        bail!("seed space exhausted (seed {})", resume.base);
    }

    Ok(resume)
}
