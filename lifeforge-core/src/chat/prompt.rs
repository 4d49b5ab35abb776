//! Prompt templates.
//!
//! Instructions are in Russian, matching the labels the model must echo back.

use crate::config::ChatMode;
use crate::protocol::Grammar;
use crate::types::Context;

/// Inputs gathered before the LLM round trip.
pub struct PromptInputs<'a> {
    pub mode: ChatMode,
    pub context: Option<&'a Context>,
    pub calendar_preview: Option<&'a str>,
    pub message: &'a str,
}

/// Compose the full prompt for one chat turn.
pub fn build_prompt(grammar: &Grammar, inputs: &PromptInputs<'_>) -> String {
    let mut prompt = String::from(
        "Ты LifeForge, персональный ассистент по целям, привычкам и расписанию. \
         Отвечай кратко и по-русски.\n",
    );
    prompt.push_str(&format!(
        "Начинай ответ пользователю с метки \"{}\".\n",
        grammar.answer_label
    ));

    if inputs.mode.uses_calendar() {
        prompt.push_str(&calendar_instructions(grammar));
    }
    if inputs.mode.uses_context() {
        prompt.push_str(&context_instructions(grammar));
    }

    if let Some(context) = inputs.context {
        prompt.push_str("\nТекущий контекст пользователя:\n");
        prompt.push_str(&render_context(grammar, context));
    }

    if let Some(preview) = inputs.calendar_preview {
        prompt.push_str("\nКалендарь:\n");
        prompt.push_str(preview.trim_end());
        prompt.push('\n');
    }

    prompt.push_str(&format!("\nЗапрос от пользователя: {}", inputs.message));
    prompt
}

fn calendar_instructions(grammar: &Grammar) -> String {
    format!(
        "\nЕсли из запроса следует, что нужно создать событие в календаре, после ответа \
         напиши {sentinel} и JSON-объект (или массив объектов) с полями: \
         is_event (true), title, start_time (RFC 3339, например 2024-01-02T18:00:00+03:00), \
         duration (часы, число), recurrence (DAILY, WEEKLY, MONTHLY или не указывать), \
         description. Если событий не нужно, напиши {sentinel} и {{}}.\n",
        sentinel = grammar.calendar_sentinel
    )
}

fn context_instructions(grammar: &Grammar) -> String {
    format!(
        "\nЕсли цели, недавние действия или прогресс пользователя изменились, после ответа \
         напиши {sentinel} и строки:\n\
         {goals} цель1, цель2\n\
         {recent} действие1, действие2\n\
         {progress} ключ:значение, ключ:значение\n\
         Указывай только изменившиеся строки.\n",
        sentinel = grammar.update_sentinel,
        goals = grammar.goals_label,
        recent = grammar.recent_label,
        progress = grammar.progress_label,
    )
}

/// Context snapshot in the same line format the model writes updates in.
fn render_context(grammar: &Grammar, context: &Context) -> String {
    let progress = context
        .progress
        .iter()
        .map(|(key, value)| format!("{key}:{value}"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "{} {}\n{} {}\n{} {}\n",
        grammar.goals_label,
        context.goals.join(", "),
        grammar.recent_label,
        context.recent5.join(", "),
        grammar.progress_label,
        progress
    )
}
