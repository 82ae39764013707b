//! Fine-grained profiling events, compiled in with the `profiling` feature.
//!
//! Every call site passes a tag stack such as `[TAG_SYSTEM, TAG_SPILL]`; an
//! event is emitted when any tag in the stack is enabled. The enabled set is
//! read from `PIPEBUF_PROFILE_TAGS` (comma separated, `*` or `all` for
//! everything) and can be replaced at runtime. Without the feature every
//! function here is a no-op and no tag is ever enabled.

use std::time::Instant;

/// Environment variable holding the comma separated list of enabled tags.
pub const PROFILE_TAGS_ENV: &str = "PIPEBUF_PROFILE_TAGS";

/// Converts elapsed time since `started_at` to microseconds, clamped to `u64::MAX`.
#[inline]
pub fn elapsed_us(started_at: Instant) -> u64 {
    started_at.elapsed().as_micros().min(u64::MAX as u128) as u64
}

/// Enables every tag.
pub fn enable_all_tags() {
    filter::replace(filter::parse(std::iter::empty()));
}

/// Replaces the enabled tag set. An empty slice, `*` or `all` enables everything.
pub fn set_enabled_tags(tags: &[&str]) {
    filter::replace(filter::parse(tags.iter().copied()));
}

/// Re-reads [`PROFILE_TAGS_ENV`].
pub fn reload_enabled_tags_from_env() {
    filter::replace(filter::from_env());
}

/// True when at least one tag of `tag_stack` is enabled.
pub fn is_tag_stack_enabled(tag_stack: &[&str]) -> bool {
    filter::allows(tag_stack)
}

/// Emits one profiling event as a `tracing` debug event on the subsystem's target.
#[inline]
pub fn event(
    target: &'static str,
    tag_stack: &[&str],
    op: &'static str,
    result: &'static str,
    elapsed_us: u64,
    message: &'static str,
) {
    #[cfg(feature = "profiling")]
    emit::event(target, tag_stack, op, result, elapsed_us, message);

    #[cfg(not(feature = "profiling"))]
    let _ = (target, tag_stack, op, result, elapsed_us, message);
}

#[cfg(feature = "profiling")]
mod filter {
    use std::collections::BTreeSet;
    use std::sync::{OnceLock, PoisonError, RwLock};

    use super::PROFILE_TAGS_ENV;

    // `None` enables every tag.
    type Enabled = Option<BTreeSet<String>>;

    fn state() -> &'static RwLock<Enabled> {
        static STATE: OnceLock<RwLock<Enabled>> = OnceLock::new();
        STATE.get_or_init(|| RwLock::new(from_env()))
    }

    pub(super) fn from_env() -> Enabled {
        let raw = std::env::var(PROFILE_TAGS_ENV).ok()?;
        parse(raw.split(','))
    }

    pub(super) fn parse<'a>(tags: impl Iterator<Item = &'a str>) -> Enabled {
        let mut enabled = BTreeSet::new();
        for tag in tags.map(str::trim).filter(|tag| !tag.is_empty()) {
            let tag = tag.to_ascii_lowercase();
            if tag == "*" || tag == "all" {
                return None;
            }
            enabled.insert(tag);
        }
        (!enabled.is_empty()).then_some(enabled)
    }

    pub(super) fn replace(enabled: Enabled) {
        *state().write().unwrap_or_else(PoisonError::into_inner) = enabled;
    }

    pub(super) fn allows(tag_stack: &[&str]) -> bool {
        let enabled = state().read().unwrap_or_else(PoisonError::into_inner);
        match enabled.as_ref() {
            None => true,
            Some(enabled) => tag_stack
                .iter()
                .any(|tag| enabled.contains(&tag.to_ascii_lowercase())),
        }
    }
}

#[cfg(not(feature = "profiling"))]
mod filter {
    pub(super) fn from_env() {}

    pub(super) fn parse<'a>(_tags: impl Iterator<Item = &'a str>) {}

    pub(super) fn replace(_enabled: ()) {}

    pub(super) fn allows(_tag_stack: &[&str]) -> bool {
        false
    }
}

#[cfg(feature = "profiling")]
mod emit {
    use crate::telemetry::tags;

    pub(super) fn event(
        target: &'static str,
        tag_stack: &[&str],
        op: &'static str,
        result: &'static str,
        elapsed_us: u64,
        message: &'static str,
    ) {
        if !super::filter::allows(tag_stack) {
            return;
        }

        // `tracing` targets must be constants, hence one arm per subsystem.
        match target {
            tags::PROFILE_POOL => {
                tracing::debug!(target: tags::PROFILE_POOL, op, result, elapsed_us, tags = ?tag_stack, "{message}")
            }
            tags::PROFILE_SPILL => {
                tracing::debug!(target: tags::PROFILE_SPILL, op, result, elapsed_us, tags = ?tag_stack, "{message}")
            }
            tags::PROFILE_WRITER => {
                tracing::debug!(target: tags::PROFILE_WRITER, op, result, elapsed_us, tags = ?tag_stack, "{message}")
            }
            tags::PROFILE_PRODUCER => {
                tracing::debug!(target: tags::PROFILE_PRODUCER, op, result, elapsed_us, tags = ?tag_stack, "{message}")
            }
            _ => {
                tracing::debug!(target: "pipebuf.profile", op, result, elapsed_us, event_target = target, tags = ?tag_stack, "{message}")
            }
        }
    }
}
