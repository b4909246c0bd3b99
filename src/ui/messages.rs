use regex::Regex;
use std::{borrow::Cow, fmt, sync::LazyLock};

use crate::{
    audio::{session::Enqueued, track::Track},
    error::{PlaybackError, QueueError},
};

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("static regex")
});

/// Removes terminal escape sequences (yt-dlp colours its errors).
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    ANSI_ESCAPE.replace_all(text, "")
}

/// Reply for a successful `/play`.
pub fn enqueued(result: &Enqueued) -> String {
    match result.tracks.as_slice() {
        [track] => {
            let mut msg = format!("{}: **{}**", result.status.label(), track);
            if let Some(url) = track.source_url() {
                msg.push_str(&format!("\n*<{url}>*"));
            }
            msg
        }
        tracks => format!("Added **{}** tracks.", tracks.len()),
    }
}

/// Reply for a failed `/play`, safe to put inside a code block.
pub fn add_failed(error: impl fmt::Display) -> String {
    let detail = strip_ansi(&error.to_string()).replace("```", "'''");
    format!("During adding the song, an error happened:```\n{}\n```", detail.trim())
}

pub fn skipping(track: &Track) -> String {
    format!("Skipping **{track}**.")
}

pub fn paused(now_paused: bool) -> &'static str {
    if now_paused {
        "Paused."
    } else {
        "Resumed."
    }
}

/// Reply for `/remove`, in the 1-based positions `/queue` shows.
pub fn removal(position: i64, result: &Result<Track, PlaybackError>) -> String {
    match result {
        Ok(track) => format!("Removed **{position}. {track}** from the queue."),
        Err(PlaybackError::Queue(QueueError::IndexOutOfRange { len: 0, .. })) => {
            "Nothing is waiting in the queue.".to_string()
        }
        Err(PlaybackError::Queue(QueueError::IndexOutOfRange { len, .. })) => {
            format!("There is no position {position}, pick one from 1 to {len}.")
        }
        Err(e) => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::session::QueueStatus,
        error::{CommandError, ResolveError, TransportError},
    };
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn track(id: &str, title: &str) -> Track {
        Track::new(id, Some(title.to_string()), Path::new("/tmp"), Some("m4a"))
    }

    #[test]
    fn strip_ansi_removes_colour_codes() {
        assert_eq!(
            strip_ansi("\x1b[0;31mERROR:\x1b[0m Video unavailable"),
            "ERROR: Video unavailable"
        );
        assert_eq!(strip_ansi("plain text"), "plain text");
    }

    #[test]
    fn single_track_reply_names_state_and_url() {
        let result = Enqueued {
            status: QueueStatus::NowPlaying,
            tracks: vec![track("a", "Song A").with_source_url("https://youtu.be/a")],
        };
        assert_eq!(enqueued(&result), "Now playing: **Song A**\n*<https://youtu.be/a>*");

        let result = Enqueued {
            status: QueueStatus::Queued,
            tracks: vec![track("b", "Song B")],
        };
        assert_eq!(enqueued(&result), "Queued: **Song B**");
    }

    #[test]
    fn playlist_reply_counts_tracks() {
        let result = Enqueued {
            status: QueueStatus::NowPlaying,
            tracks: vec![track("a", "A"), track("b", "B"), track("c", "C")],
        };
        assert_eq!(enqueued(&result), "Added **3** tracks.");
    }

    #[test]
    fn add_failure_is_sanitized() {
        let error = PlaybackError::Resolve(ResolveError::Extraction(
            "\x1b[0;31mERROR:\x1b[0m bad ```format```".into(),
        ));
        assert_eq!(
            add_failed(&error),
            "During adding the song, an error happened:```\nextraction failed: ERROR: bad '''format'''\n```"
        );
    }

    #[test]
    fn transport_failure_renders_as_text() {
        let error = PlaybackError::Transport(TransportError::NotConnected);
        assert!(add_failed(&error).contains("no voice connection"));
    }

    #[test]
    fn removal_reports_the_position_the_user_typed() {
        assert_eq!(
            removal(2, &Ok(track("b", "Song B"))),
            "Removed **2. Song B** from the queue."
        );

        // /remove 4 on a two-track queue, rejected as index 3.
        let out_of_range = Err(PlaybackError::Queue(QueueError::IndexOutOfRange { index: 3, len: 2 }));
        assert_eq!(removal(4, &out_of_range), "There is no position 4, pick one from 1 to 2.");

        let empty = Err(PlaybackError::Queue(QueueError::IndexOutOfRange { index: 0, len: 0 }));
        assert_eq!(removal(1, &empty), "Nothing is waiting in the queue.");

        let idle = Err(PlaybackError::Command(CommandError::NotPlaying));
        assert_eq!(removal(1, &idle), "I'm not playing anything");
    }

    #[test]
    fn pause_reply_follows_new_state() {
        assert_eq!(paused(true), "Paused.");
        assert_eq!(paused(false), "Resumed.");
    }
}
