//! Notification texts, formatted for Telegram's `Markdown` parse mode.

use crate::api::models::upload::ClientAddr;

pub fn client_connected(info: &str, client: &ClientAddr) -> String {
    format!("📡 *New Client Connected*\n\n{info}\n\n🌍 Server IP: `{client}`")
}

pub fn new_file(filename: &str, size: u64) -> String {
    format!("📂 *New File*\n📄 Name: `{filename}`\n📦 Size: `{size}` bytes")
}
