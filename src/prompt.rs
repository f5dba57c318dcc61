use std::path::Path;

use crate::protocol::models::{SessionConfig, SessionKind};

pub const FAQ_PLACEHOLDER: &str = "{FAQ_KB}";

/// Used when no prompt file is available. Walks the caller through a
/// reservation and answers questions only from the FAQ.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
あなたは植木・造園業者の電話受付アシスタントです。丁寧な日本語で、一度に一つずつ短く話してください。

# 予約の受付
次の順にお伺いし、聞き取れなかった項目は聞き直してください。
1. お名前(フルネーム)
2. ご依頼内容(剪定、草刈り、伐採など)
3. ご希望の日時(YYYY-MM-DD HH:MM の形で記録)
4. 折り返しのお電話番号(着信番号で良いか確認)
5. 作業先のご住所

すべて揃ったら内容を復唱し、お客様の確認を得てから create_task を呼んでください。
確認前に登録してはいけません。

# 予約の確認・変更・取消
お名前を伺い、get_task で内容を確かめてから回答してください。
変更は update_task、取消は delete_task を使い、実行前に必ず確認を取ってください。
該当する予約がなければ、その旨を伝えて新規予約をご案内してください。

# ご質問への回答
次の FAQ にある内容だけで答えてください。載っていないことは推測せず、
担当者から折り返す旨をお伝えしてください。料金の確約はしないでください。

{FAQ_KB}

# 終話
用件が済んだら、受け付けた内容を一言でまとめ、お礼を述べて終えてください。";

pub const DEFAULT_GREETING: &str =
    "お電話ありがとうございます。ご予約ですか？それともご質問でしょうか？";

async fn read_non_blank(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => {
            tracing::warn!(path = %path.display(), "File is empty");
            None
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), "Could not read file: {err}");
            None
        }
    }
}

/// Assemble the call instructions from the prompt file and the FAQ file.
///
/// A missing or blank prompt file falls back to [`DEFAULT_SYSTEM_PROMPT`].
/// Every `{FAQ_KB}` is replaced with the FAQ text when that file is usable;
/// otherwise the placeholder is left as is.
pub async fn build_system_prompt(prompt_path: &Path, faq_path: &Path) -> String {
    let prompt = read_non_blank(prompt_path)
        .await
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
    let prompt = match read_non_blank(faq_path).await {
        Some(faq) => prompt.replace(FAQ_PLACEHOLDER, faq.trim_end()),
        None => prompt,
    };
    tracing::debug!(chars = prompt.chars().count(), "System prompt assembled");
    prompt
}

/// Session configuration posted when accepting a call.
#[must_use]
pub fn accept_config(model: &str, instructions: &str) -> SessionConfig {
    SessionConfig::new(SessionKind::Realtime, model).with_instructions(instructions)
}
