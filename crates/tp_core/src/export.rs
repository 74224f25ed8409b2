//! Static HTML rendering of a digest, grouped by major category.

use std::fmt::Write;

use chrono::NaiveDate;

use crate::category::UNCATEGORIZED;
use crate::types::{TopicArticle, TopicRecord};

const STYLE: &str = "body { font-family: sans-serif; margin: 2em; }
    h1 { color: #1a237e; }
    .article { border-bottom: 1px solid #ccc; margin-bottom: 1em; padding-bottom: 1em; }
    .category { font-weight: bold; color: #1565c0; }
    .summary { margin: 0.5em 0; }
    .labels { color: #388e3c; font-size: 0.95em; }";

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Only `http` and `https` urls are linked.
fn link_target(url: &str) -> Option<&str> {
    let parsed = url::Url::parse(url.trim()).ok()?;
    matches!(parsed.scheme(), "http" | "https").then_some(url)
}

fn major_of(member: &TopicArticle) -> &str {
    member.category_major.as_deref().unwrap_or(UNCATEGORIZED)
}

/// Members in display order, bucketed by major category in order of first
/// appearance.
pub fn group_by_major(members: &[TopicArticle]) -> Vec<(&str, Vec<&TopicArticle>)> {
    let mut sorted: Vec<&TopicArticle> = members.iter().collect();
    sorted.sort_by_key(|m| m.display_order);

    let mut groups: Vec<(&str, Vec<&TopicArticle>)> = Vec::new();
    for member in sorted {
        let major = major_of(member);
        match groups.iter_mut().find(|(name, _)| *name == major) {
            Some((_, bucket)) => bucket.push(member),
            None => groups.push((major, vec![member])),
        }
    }
    groups
}

pub fn render_topic_html(record: &TopicRecord, generated_on: NaiveDate) -> String {
    let title = escape_html(&record.topic.title);
    let summary = record
        .topic
        .monthly_summary
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(escape_html)
        .unwrap_or_else(|| "月次まとめはありません。".to_string());

    let mut html = String::new();
    // Writing into a String cannot fail.
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"ja\">\n<head>\n  <meta charset=\"UTF-8\">\n  <title>{title} - 半導体TOPICS配信</title>\n  <style>\n    {STYLE}\n  </style>\n</head>\n<body>\n  <h1>{title}</h1>\n  <p>作成日: {date}</p>\n  <h2>月次まとめ</h2>\n  <div>{summary}</div>\n  <h2>記事一覧</h2>\n",
        date = generated_on.format("%Y/%m/%d"),
    );

    for (major, members) in group_by_major(&record.articles) {
        let _ = writeln!(html, "  <h3>{}</h3>\n  <div>", escape_html(major));
        for member in members {
            let article = &member.article;
            let minor = member
                .category_minor
                .iter()
                .map(|m| escape_html(m))
                .collect::<Vec<_>>()
                .join(", ");
            let published = article
                .published
                .map(|p| p.format("%Y/%m/%d").to_string())
                .unwrap_or_else(|| "日付不明".to_string());
            let labels = if article.labels.is_empty() {
                "なし".to_string()
            } else {
                article
                    .labels
                    .iter()
                    .map(|l| escape_html(l))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let title = escape_html(&article.title);
            let heading = match link_target(&article.url) {
                Some(url) => format!("<a href=\"{}\">{}</a>", escape_html(url), title),
                None => title,
            };
            let _ = write!(
                html,
                "    <div class=\"article\">\n      <div class=\"category\">[{major}] {minor}</div>\n      <div>{heading}（{source} / {published}）</div>\n      <div class=\"summary\">{summary}</div>\n      <div class=\"labels\">タグ: {labels}</div>\n    </div>\n",
                major = escape_html(major),
                source = escape_html(&article.source),
                summary = escape_html(article.summary.as_deref().unwrap_or_default()),
            );
        }
        html.push_str("  </div>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}
