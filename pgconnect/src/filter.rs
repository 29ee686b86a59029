// Parameterised predicates with positional `?` placeholders

use crate::errors::DatabaseError;
use crate::value::SqlValue;
use sqlx::{Postgres, QueryBuilder};

/// A WHERE-clause predicate plus its bound arguments
///
/// Placeholders are written as `?` and bound in order. A `?` inside a
/// single-quoted literal is left alone; write `??` for a literal `?`
/// operator (e.g. jsonb `data ?? 'key'`).
///
/// ```
/// use pgconnect::filter::Filter;
///
/// let active = Filter::new("status = ? AND age >= ?").bind("active").bind(18i32);
/// assert_eq!(active.placeholder_count(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    expr: String,
    args: Vec<SqlValue>,
}

impl Filter {
    pub fn new(expr: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            args: Vec::new(),
        }
    }

    /// Create a filter with all of its arguments at once
    pub fn with_args(expr: impl Into<String>, args: Vec<SqlValue>) -> Self {
        Self {
            expr: expr.into(),
            args,
        }
    }

    /// Bind the next positional argument
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn args(&self) -> &[SqlValue] {
        &self.args
    }

    /// Number of `?` placeholders in the expression
    pub fn placeholder_count(&self) -> usize {
        Segments::new(&self.expr)
            .filter(|s| matches!(s, Segment::Placeholder))
            .count()
    }

    /// Append the predicate to `builder`, turning each placeholder into `$n`
    ///
    /// # Errors
    /// Returns `DatabaseError::InvalidFilter` if the expression is empty or the
    /// number of placeholders differs from the number of bound arguments.
    /// Nothing is pushed in that case.
    pub(crate) fn push_to<'args>(
        &self,
        builder: &mut QueryBuilder<'args, Postgres>,
    ) -> Result<(), DatabaseError> {
        if self.expr.trim().is_empty() {
            return Err(DatabaseError::InvalidFilter(
                "filter expression is empty".to_string(),
            ));
        }

        let expected = self.placeholder_count();
        if expected != self.args.len() {
            return Err(DatabaseError::InvalidFilter(format!(
                "'{}' expects {} argument(s), got {}",
                self.expr,
                expected,
                self.args.len()
            )));
        }

        let mut args = self.args.iter().cloned();
        builder.push("(");
        for segment in Segments::new(&self.expr) {
            match segment {
                Segment::Text(text) => {
                    builder.push(text);
                }
                Segment::Question => {
                    builder.push("?");
                }
                Segment::Placeholder => {
                    // Count was checked above
                    if let Some(arg) = args.next() {
                        arg.push_bind(builder);
                    }
                }
            }
        }
        builder.push(")");

        Ok(())
    }
}

/// Build a [`Filter`] from an expression and its arguments
///
/// ```
/// use pgconnect::filter;
///
/// let f = filter!("status = ?", "active");
/// assert_eq!(f.args().len(), 1);
/// ```
#[macro_export]
macro_rules! filter {
    ($expr:expr $(, $arg:expr)* $(,)?) => {
        $crate::filter::Filter::new($expr)$(.bind($arg))*
    };
}

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Text(&'a str),
    /// `??`, rendered as a literal `?`
    Question,
    Placeholder,
}

/// Splits an expression into literal text and placeholders
struct Segments<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Segments<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.src[self.pos..];
        if rest.is_empty() {
            return None;
        }

        let bytes = rest.as_bytes();
        if bytes[0] == b'?' {
            if bytes.get(1) == Some(&b'?') {
                self.pos += 2;
                return Some(Segment::Question);
            }
            self.pos += 1;
            return Some(Segment::Placeholder);
        }

        // Consume text up to the next `?` outside a quoted literal or
        // identifier. A doubled quote closes and reopens the same quote, and
        // `E'..'` literals also escape with a backslash.
        let mut quote: Option<u8> = None;
        let mut backslash_escapes = false;
        let mut end = bytes.len();
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            match quote {
                Some(_) if b == b'\\' && backslash_escapes => {
                    i += 2;
                    continue;
                }
                Some(q) if b == q => quote = None,
                Some(_) => {}
                None => match b {
                    b'\'' => {
                        let reopened = i > 0 && bytes[i - 1] == b'\'';
                        if !reopened {
                            backslash_escapes = is_escape_string_prefix(bytes, i);
                        }
                        quote = Some(b);
                    }
                    b'"' => {
                        backslash_escapes = false;
                        quote = Some(b);
                    }
                    b'?' => {
                        end = i;
                        break;
                    }
                    _ => {}
                },
            }
            i += 1;
        }

        self.pos += end;
        Some(Segment::Text(&rest[..end]))
    }
}

/// Whether the quote at `quote_at` opens an `E'..'` escape string
fn is_escape_string_prefix(bytes: &[u8], quote_at: usize) -> bool {
    if quote_at == 0 || !matches!(bytes[quote_at - 1], b'E' | b'e') {
        return false;
    }
    quote_at < 2 || !(bytes[quote_at - 2].is_ascii_alphanumeric() || bytes[quote_at - 2] == b'_')
}
