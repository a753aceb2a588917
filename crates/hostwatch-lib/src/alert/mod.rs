//! Alert composition and delivery
//!
//! This module provides:
//! - Rendering of high-load and fallback-baseline notifications
//! - Public address lookup for the alert header
//! - Delivery to Telegram chats

mod address;
mod composer;
mod notifier;

pub use address::{
    HttpAddressResolver, PublicAddressResolver, DEFAULT_PUBLIC_IP_URL, UNKNOWN_ADDRESS,
};
pub use composer::{format_process_summary, AlertComposer, NotificationSnapshot};
pub use notifier::{DeliveryReport, Notifier, TelegramNotifier, DEFAULT_TELEGRAM_API_URL};
