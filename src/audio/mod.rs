//! # Audio Module
//!
//! Queueing and playback for every guild the bot is in.
//!
//! ## Architecture
//!
//! ### [`track`] - Track
//! - Immutable value for one downloaded item
//! - Display title and on-disk path derivation
//!
//! ### [`queue`] - Queue Management
//! - FIFO queue with an explicit "current track" cursor
//! - Pending titles, removal by position, clearing
//!
//! ### [`session`] - Playback Session
//! - Per-guild state machine (idle / playing / paused)
//! - Reacts to track completions reported by the transport
//!
//! ### [`registry`] - Session Registry
//! - Lazily builds one session per guild, race-free
//!
//! ### [`transport`] - Voice Transport
//! - Seam between sessions and songbird
//! - Completion handles delivered through the session mailbox
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let registry = SessionRegistry::new(transports, resolver);
//! let session = registry.get_or_create(guild_id).await?;
//!
//! let enqueued = session.add("never gonna give you up").await?;
//! session.pause().await?;
//! session.skip().await?;
//! session.stop().await;
//! ```

pub mod queue;
pub mod registry;
pub mod session;
pub mod track;
pub mod transport;
