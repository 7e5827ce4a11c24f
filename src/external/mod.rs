//! External collaborators
//!
//! Trait seams for everything the engines consume but do not own: wall clock,
//! token entropy, content digests and the outbound notification channel.
//! Production implementations live next to each trait; deterministic doubles
//! are provided for tests and dry runs.

pub mod clock;
pub mod hashing;
pub mod notify;
pub mod templates;
pub mod tokens;

pub use clock::{Clock, FixedClock, SystemClock};
pub use hashing::{ContentHasher, Sha256Hasher};
pub use notify::{LogNotifier, NotificationSender, RecordingNotifier, SentNotification};
pub use templates::Notification;
pub use tokens::{SecureTokenGenerator, TokenGenerator};
