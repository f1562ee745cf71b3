//! Prompt building for row synthesis

use tapline_core::Column;

use crate::client::ChatMessage;

/// System instruction fixing the record count and the `data` array key.
pub fn system_prompt(count: u32) -> String {
    format!(
        "You generate data in JSON format. Generate {} records in a json array located on the data key",
        count
    )
}

/// `"<column> is <type>"` for every column, comma separated.
pub fn describe_columns(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|c| format!("{} is {}", c.column, c.data_type))
        .collect::<Vec<_>>()
        .join(",")
}

/// The caller's prompt followed by the record shape.
pub fn user_prompt(prompt: &str, columns: &[Column]) -> String {
    format!(
        "{}\nEach record looks like this: {}",
        prompt,
        describe_columns(columns)
    )
}

pub fn build_messages(prompt: &str, columns: &[Column], count: u32) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt(count)),
        ChatMessage::user(user_prompt(prompt, columns)),
    ]
}
