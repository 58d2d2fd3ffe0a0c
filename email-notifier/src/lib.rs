pub mod email_notifier;
pub mod render;

pub use email_notifier::{EmailConfig, EmailNotifier, NotifyError};
pub use render::{render_html, render_text, subject};
