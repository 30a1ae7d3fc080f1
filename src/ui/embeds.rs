use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::audio::{
    queue::QueueSnapshot,
    track::{format_duration, Track},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Jukebox";

pub const ITEMS_PER_PAGE: usize = 10;

fn origin_suffix(track: &Track) -> String {
    track
        .playlist_origin
        .as_ref()
        .map(|origin| format!(" (from {})", origin))
        .unwrap_or_default()
}

/// Line describing the current track, followed by a blank line.
pub fn now_playing_line(snapshot: &QueueSnapshot) -> String {
    match &snapshot.current {
        Some(current) => format!(
            "**Now Playing:** {}{} [{}]{}\n\n",
            current.title,
            if current.looping { " (Looping)" } else { "" },
            format_duration(current.duration),
            origin_suffix(current)
        ),
        None => "No song is currently playing\n\n".to_string(),
    }
}

/// Now-playing line plus one numbered line per upcoming track on `page`.
pub fn describe_queue(snapshot: &QueueSnapshot, page: usize) -> String {
    let mut description = now_playing_line(snapshot);

    if snapshot.upcoming.is_empty() {
        description.push_str("The queue is currently empty");
        return description;
    }

    let queue_page = snapshot.page(page, ITEMS_PER_PAGE);
    let lines: Vec<String> = queue_page
        .items
        .iter()
        .enumerate()
        .map(|(i, track)| {
            format!(
                "{}. {} [{}]{}",
                queue_page.first_position + i,
                track.title,
                format_duration(track.duration),
                origin_suffix(track)
            )
        })
        .collect();
    description.push_str(&lines.join("\n"));
    description
}

/// Embed for the queue command. `None` when nothing is queued, in which case
/// the plain description is enough.
pub fn create_queue_embed(snapshot: &QueueSnapshot, page: usize) -> Option<CreateEmbed> {
    if snapshot.upcoming.is_empty() {
        return None;
    }

    let queue_page = snapshot.page(page, ITEMS_PER_PAGE);
    let footer = format!(
        "Page {}/{} • {} tracks • {} total • {}",
        queue_page.current_page,
        queue_page.total_pages,
        snapshot.upcoming.len(),
        format_duration(snapshot.total_duration()),
        STANDARD_FOOTER
    );

    Some(
        CreateEmbed::default()
            .title("Music Queue")
            .description(describe_queue(snapshot, page))
            .color(colors::INFO_BLUE)
            .footer(CreateEmbedFooter::new(footer))
            .timestamp(Timestamp::now()),
    )
}

pub fn create_error_embed(description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .description(format!("❌ {}", description))
        .color(colors::ERROR_RED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::PlaybackState;
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;
    use std::time::Duration;

    fn track(title: &str, secs: u64) -> Track {
        Track::new(title, title, UserId::new(1)).with_duration(Duration::from_secs(secs))
    }

    #[test]
    fn empty_queue_without_current_track() {
        let snapshot = QueueSnapshot {
            current: None,
            upcoming: Vec::new(),
            state: PlaybackState::Idle,
        };

        assert_eq!(
            describe_queue(&snapshot, 1),
            "No song is currently playing\n\nThe queue is currently empty"
        );
        assert!(create_queue_embed(&snapshot, 1).is_none());
    }

    #[test]
    fn marks_looping_and_playlist_origin() {
        let mut current = track("Intro", 3725).with_playlist_origin("Live Set");
        current.looping = true;
        let snapshot = QueueSnapshot {
            current: Some(current),
            upcoming: vec![track("Next", 65), track("Last", 5).with_playlist_origin("Live Set")],
            state: PlaybackState::Playing,
        };

        assert_eq!(
            describe_queue(&snapshot, 1),
            "**Now Playing:** Intro (Looping) [1:02:05] (from Live Set)\n\n\
             1. Next [1:05]\n\
             2. Last [0:05] (from Live Set)"
        );
    }

    #[test]
    fn later_pages_keep_queue_positions() {
        let snapshot = QueueSnapshot {
            current: None,
            upcoming: (1..=12).map(|i| track(&format!("t{i}"), 60)).collect(),
            state: PlaybackState::Idle,
        };

        let description = describe_queue(&snapshot, 2);
        assert!(description.ends_with("11. t11 [1:00]\n12. t12 [1:00]"));
        assert!(create_queue_embed(&snapshot, 2).is_some());
    }
}
