use crate::Result;
use anyhow::Context;
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, Time, format_description::well_known::Rfc3339,
    macros::format_description,
};

#[macro_export]
macro_rules! truncate_long {
    ($query:expr) => {
        format_args!(
            "{}{}",
            $crate::truncated(&$query, 497).trim_end(),
            if $query.len() > 497 { "..." } else { "" },
        )
    };
}

/// Implement [`Executor`](crate::Executor) for a transaction type by
/// delegating to the connection it borrows.
#[macro_export]
macro_rules! impl_executor_transaction {
    ($driver:ty, $transaction:ident $(< $lt:lifetime >)?, $connection:ident) => {
        impl $(<$lt>)? $crate::Executor for $transaction $(<$lt>)? {
            type Driver = $driver;

            fn driver(&self) -> &Self::Driver {
                $crate::Executor::driver(&*self.$connection)
            }

            fn run(
                &mut self,
                command: $crate::Command,
            ) -> impl $crate::stream::Stream<Item = $crate::Result<$crate::QueryResult>> + Send {
                $crate::Executor::run(&mut *self.$connection, command)
            }
        }
    };
}

/// Longest prefix of `value` not exceeding `len` bytes that ends on a char boundary.
pub fn truncated(value: &str, len: usize) -> &str {
    if value.len() <= len {
        return value;
    }
    let mut end = len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

pub fn separated_by<T, F>(
    out: &mut String,
    values: impl IntoIterator<Item = T>,
    mut f: F,
    separator: &str,
) where
    F: FnMut(&mut String, T),
{
    let mut len = out.len();
    for v in values {
        if out.len() > len {
            out.push_str(separator);
        }
        len = out.len();
        f(out, v);
    }
}

/// Remove a leading SQL keyword (`WHERE`, `ORDER BY`) from a fragment, so that
/// callers can pass either `"WHERE id = 1"` or `"id = 1"`.
pub fn strip_keyword<'s>(fragment: &'s str, keyword: &str) -> &'s str {
    let fragment = fragment.trim();
    let words = keyword.split_whitespace();
    let mut rest = fragment;
    for word in words {
        let trimmed = rest.trim_start();
        match trimmed.get(..word.len()) {
            Some(head) if head.eq_ignore_ascii_case(word) => {
                let tail = &trimmed[word.len()..];
                if !tail.is_empty() && !tail.starts_with(char::is_whitespace) {
                    return fragment;
                }
                rest = tail;
            }
            _ => return fragment,
        }
    }
    rest.trim()
}

/// Split `fragment` on the commas outside parentheses and quotes.
fn split_top_level(fragment: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in fragment.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(..), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                result.push(&fragment[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    result.push(&fragment[start..]);
    result
}

/// `term` without a trailing `keyword` separated by whitespace, ignoring case.
fn strip_trailing_keyword<'s>(term: &'s str, keyword: &str) -> Option<&'s str> {
    let split = term.len().checked_sub(keyword.len())?;
    let (head, tail) = (term.get(..split)?, term.get(split..)?);
    (tail.eq_ignore_ascii_case(keyword) && head.ends_with(char::is_whitespace))
        .then(|| head.trim_end())
}

/// Reverse an `ORDER BY` list term by term: `ASC` and `DESC` swap, bare terms
/// become `DESC`, `NULLS FIRST` and `NULLS LAST` swap.
pub fn reverse_ordering(order_by: &str) -> String {
    split_top_level(order_by)
        .into_iter()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|term| {
            let (term, nulls) = if let Some(v) = strip_trailing_keyword(term, "NULLS FIRST") {
                (v, " NULLS LAST")
            } else if let Some(v) = strip_trailing_keyword(term, "NULLS LAST") {
                (v, " NULLS FIRST")
            } else {
                (term, "")
            };
            let (term, direction) = if let Some(v) = strip_trailing_keyword(term, "DESC") {
                (v, "ASC")
            } else if let Some(v) = strip_trailing_keyword(term, "ASC") {
                (v, "DESC")
            } else {
                (term, "DESC")
            };
            format!("{} {}{}", term, direction, nulls)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split a comma separated list of names, trimming whitespace and dropping empty entries.
pub fn split_names(names: &str) -> Box<[String]> {
    names
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

pub fn format_date(value: &Date) -> Result<String> {
    Ok(value.format(format_description!("[year]-[month]-[day]"))?)
}

pub fn parse_date(value: &str) -> Result<Date> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]"))
        .with_context(|| format!("Cannot parse `{}` as a date", truncate_long!(value)))
}

pub fn format_time(value: &Time) -> Result<String> {
    Ok(value.format(format_description!(
        "[hour]:[minute]:[second][optional [.[subsecond]]]"
    ))?)
}

pub fn parse_time(value: &str) -> Result<Time> {
    Time::parse(
        value.trim(),
        format_description!("[hour]:[minute]:[second][optional [.[subsecond]]]"),
    )
    .with_context(|| format!("Cannot parse `{}` as a time", truncate_long!(value)))
}

pub fn format_timestamp(value: &PrimitiveDateTime) -> Result<String> {
    Ok(value.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"
    ))?)
}

pub fn parse_timestamp(value: &str) -> Result<PrimitiveDateTime> {
    let value = value.trim().replacen('T', " ", 1);
    PrimitiveDateTime::parse(
        &value,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"),
    )
    .with_context(|| format!("Cannot parse `{}` as a timestamp", truncate_long!(value)))
}

pub fn format_timestamp_with_timezone(value: &OffsetDateTime) -> Result<String> {
    Ok(value.format(&Rfc3339)?)
}

pub fn parse_timestamp_with_timezone(value: &str) -> Result<OffsetDateTime> {
    let value = value.trim().replacen(' ', "T", 1);
    OffsetDateTime::parse(&value, &Rfc3339).with_context(|| {
        format!(
            "Cannot parse `{}` as a timestamp with time zone",
            truncate_long!(value)
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_leading_keywords() {
        assert_eq!(strip_keyword("WHERE id = 1", "WHERE"), "id = 1");
        assert_eq!(strip_keyword("  where   id = 1 ", "WHERE"), "id = 1");
        assert_eq!(strip_keyword("id = 1", "WHERE"), "id = 1");
        assert_eq!(strip_keyword("ORDER BY name DESC", "ORDER BY"), "name DESC");
        assert_eq!(strip_keyword("order  by name", "ORDER BY"), "name");
        assert_eq!(strip_keyword("wherever = 1", "WHERE"), "wherever = 1");
    }

    #[test]
    fn reverse_orderings() {
        assert_eq!(reverse_ordering("id"), "id DESC");
        assert_eq!(reverse_ordering("name DESC"), "name ASC");
        assert_eq!(reverse_ordering("order_id, line"), "order_id DESC, line DESC");
        assert_eq!(reverse_ordering("a asc,b  desc"), "a DESC, b ASC");
        assert_eq!(
            reverse_ordering("COALESCE(a, b) DESC NULLS LAST, \"odd, name\""),
            "COALESCE(a, b) ASC NULLS FIRST, \"odd, name\" DESC"
        );
        assert_eq!(reverse_ordering("describe"), "describe DESC");
        assert_eq!(reverse_ordering(""), "");
    }

    #[test]
    fn split_key_lists() {
        assert_eq!(&*split_names(" a, b ,c,,"), ["a", "b", "c"]);
        assert!(split_names("").is_empty());
    }
}
