//! Chat rendering of a [`SyncReport`].

use kassa_core::{NormalizedTransaction, SyncReport, BALANCE_EPSILON};

/// Chunk limit kept below Telegram's 4096 so Markdown has headroom.
pub const MAX_MESSAGE_LEN: usize = 4000;

const RULE: &str = "--------------------";

/// Renders the report as Telegram Markdown (Ukrainian labels).
///
/// A failed report renders only the header and the error.
pub fn format_report(report: &SyncReport) -> String {
    let mut lines = Vec::new();
    let icon = if report.has_discrepancies() { "⚠️" } else { "✅" };
    lines.push(format!(
        "{icon} *Звіт синхронізації: {} до {}*",
        report.start_date, report.end_date
    ));
    lines.push(RULE.to_string());

    if let Some(error) = &report.error_message {
        lines.push(format!("🚨 *ПОМИЛКА:* {}", escape_markdown(error)));
        lines.push(RULE.to_string());
        return lines.join("\n");
    }

    lines.push(format!("Privat Отримано: {}", report.privat_transactions_count));
    lines.push(format!("Poster Отримано: {}", report.poster_transactions_count));
    lines.push(format!("Зіставлено пар: {}", report.matched_pairs_count));
    lines.push(format!("Незбігів Privat: {}", report.unmatched_privat.len()));
    lines.push(format!("Незбігів Poster: {}", report.unmatched_poster.len()));

    if let Some(balance) = report.privat_balance {
        lines.push(format!("Баланс Privat: `{balance}`"));
    }
    if let Some(balance) = report.poster_balance {
        lines.push(format!("Баланс Poster: `{balance}`"));
    }
    if let Some(diff) = report.balance_diff() {
        let sign = if diff.is_positive() { "+" } else { "" };
        let icon = if diff.abs().as_decimal() <= BALANCE_EPSILON {
            "✅"
        } else {
            "❗"
        };
        lines.push(format!(
            "Різниця балансів (Privat - Poster): {icon} `{sign}{diff}`"
        ));
    }
    lines.push(RULE.to_string());

    push_section(&mut lines, "PrivatBank", &report.all_privat_transactions);
    push_section(&mut lines, "Poster", &report.all_poster_transactions);

    if !report.has_discrepancies() {
        lines.push("✅ Синхронізація успішна, розбіжностей не знайдено.".to_string());
    } else if report.unmatched_privat.is_empty() && report.unmatched_poster.is_empty() {
        lines.push("⚠️ Виявлено розбіжність лише в балансах.".to_string());
    }

    lines.join("\n")
}

fn push_section(lines: &mut Vec<String>, title: &str, transactions: &[NormalizedTransaction]) {
    lines.push(format!("*Транзакції {title} ({}):*", transactions.len()));
    if transactions.is_empty() {
        lines.push("  (Немає)".to_string());
    }
    lines.extend(transactions.iter().map(format_transaction));
    lines.push(RULE.to_string());
}

fn format_transaction(tx: &NormalizedTransaction) -> String {
    let marker = if tx.matched_status { "✅" } else { "❗" };
    let time = tx
        .time
        .map_or_else(|| "Немає часу".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
    let amount = format!("{:<8}", tx.amount.to_string());
    let description = tx
        .description
        .as_deref()
        .map(strip_markdown)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| "Н/Д".to_string());
    format!(
        "  {marker} {time}, `{amount}` {}, Опис: {description}",
        tx.currency.as_deref().unwrap_or("")
    )
}

/// Backslash-escapes the characters legacy Markdown treats as entity markers.
fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn strip_markdown(text: &str) -> String {
    text.chars().filter(|c| !matches!(c, '*' | '_' | '`')).collect()
}

/// Splits `text` into chunks of at most `max` chars on line boundaries.
///
/// A line longer than `max` is cut on char boundaries. Joining the chunks
/// with `\n` gives back the input, except for whitespace-only chunks which
/// are skipped.
pub fn split_message(text: &str, max: usize) -> Vec<String> {
    let max = max.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    let mut open = false;

    for line in text.split('\n') {
        for piece in hard_split(line, max) {
            let len = piece.chars().count();
            if open && current_len + 1 + len > max {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
                open = false;
            }
            if open {
                current.push('\n');
                current_len += 1;
            }
            current.push_str(piece);
            current_len += len;
            open = true;
        }
    }
    if open {
        chunks.push(current);
    }

    chunks.retain(|c| !c.trim().is_empty());
    chunks
}

fn hard_split(line: &str, max: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (count, (idx, _)) in line.char_indices().enumerate() {
        if count > 0 && count % max == 0 {
            pieces.push(&line[start..idx]);
            start = idx;
        }
    }
    pieces.push(&line[start..]);
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use kassa_core::{Money, ReportBuilder, Source};

    fn tx(source: Source, id: &str, cents: i64, desc: &str, matched: bool) -> NormalizedTransaction {
        let mut tx = NormalizedTransaction::new(source, id, Money::from_minor_units(cents))
            .with_description(desc)
            .with_time(
                NaiveDate::from_ymd_opt(2025, 5, 1)
                    .unwrap()
                    .and_hms_opt(10, 15, 0)
                    .unwrap(),
            );
        tx.matched_status = matched;
        tx
    }

    fn report() -> SyncReport {
        ReportBuilder::new("30.04.2025", "01.05.2025")
            .privat(
                vec![
                    tx(Source::Privat, "a1", -10_000, "Оплата *Метро*", true),
                    tx(Source::Privat, "a2", -5_000, "Таксі", false),
                ],
                Some(Money::from_minor_units(100_000)),
            )
            .poster(
                vec![tx(Source::Poster, "b1", -10_050, "", true)],
                Some(Money::from_minor_units(99_000)),
            )
            .matched_pairs(1)
            .build()
    }

    #[test]
    fn renders_counts_balances_and_markers() {
        let text = format_report(&report());
        assert!(text.starts_with("⚠️ *Звіт синхронізації: 30.04.2025 до 01.05.2025*"));
        assert!(text.contains("Зіставлено пар: 1"));
        assert!(text.contains("Незбігів Privat: 1"));
        assert!(text.contains("Баланс Privat: `1000.00`"));
        assert!(text.contains("Різниця балансів (Privat - Poster): ❗ `+10.00`"));
        assert!(text.contains("  ✅ 2025-05-01 10:15, `-100.00 ` , Опис: Оплата Метро"));
        assert!(text.contains("❗ 2025-05-01 10:15, `-50.00  ` , Опис: Таксі"));
        assert!(text.contains("Опис: Н/Д"));
        assert!(!text.contains("a1"), "ids are not shown");
    }

    #[test]
    fn clean_report_gets_success_verdict() {
        let report = ReportBuilder::new("s", "e")
            .privat(vec![tx(Source::Privat, "a1", -100, "x", true)], None)
            .poster(Vec::new(), None)
            .matched_pairs(1)
            .build();
        let text = format_report(&report);
        assert!(text.starts_with("✅"));
        assert!(text.contains("*Транзакції Poster (0):*\n  (Немає)"));
        assert!(text.ends_with("✅ Синхронізація успішна, розбіжностей не знайдено."));
    }

    #[test]
    fn balance_only_verdict() {
        let mut report = report();
        report.unmatched_privat.clear();
        assert!(format_report(&report).ends_with("⚠️ Виявлено розбіжність лише в балансах."));
    }

    #[test]
    fn failed_report_renders_error_only() {
        let text = format_report(&SyncReport::failed("N/A", "N/A", "both feeds down"));
        assert!(text.contains("🚨 *ПОМИЛКА:* both feeds down"));
        assert!(!text.contains("Отримано"));
    }

    #[test]
    fn error_text_cannot_break_markdown() {
        let text = format_report(&SyncReport::failed(
            "s",
            "e",
            r#"poster.account_id must be positive; body: {"error":"*bad*"} `x` [y"#,
        ));
        assert!(text.contains(r"poster.account\_id"));

        let bare = text
            .replace(r"\_", "")
            .replace(r"\*", "")
            .replace(r"\`", "")
            .replace(r"\[", "");
        assert_eq!(bare.matches('_').count() % 2, 0);
        assert_eq!(bare.matches('*').count() % 2, 0);
        assert_eq!(bare.matches('`').count() % 2, 0);
        assert!(!bare.contains('['));
    }

    #[test]
    fn short_text_is_single_chunk() {
        assert_eq!(split_message("a\nb", 10), vec!["a\nb".to_string()]);
        assert!(split_message("", 10).is_empty());
    }

    #[test]
    fn splits_on_lines_without_loss() {
        let text = (0..50).map(|i| format!("рядок {i:02}")).collect::<Vec<_>>().join("\n");
        let chunks = split_message(&text, 40);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 40));
        assert_eq!(chunks.join("\n"), text);
    }

    #[test]
    fn overlong_line_is_hard_split() {
        let line = "ї".repeat(9_000);
        let chunks = split_message(&line, MAX_MESSAGE_LEN);
        let lens: Vec<_> = chunks.iter().map(|c| c.chars().count()).collect();
        assert_eq!(lens, vec![4000, 4000, 1000]);
        assert_eq!(chunks.concat(), line);
    }

    #[test]
    fn blank_chunks_are_skipped() {
        let chunks = split_message("abc\n\n\n\ndef", 3);
        assert_eq!(chunks, vec!["abc".to_string(), "def".to_string()]);
    }
}
