// Property-based tests for statement generation and configuration
//
// These run without a database: they check the SQL text and parameter
// numbering that repositories send to the server.

use pgconnect::entity::{Column, ColumnType, Entity};
use pgconnect::{sql, Config, DatabaseError, Filter, SqlValue};
use proptest::prelude::*;

#[derive(Debug, Clone, sqlx::FromRow)]
struct Ticket {
    id: Option<i64>,
    status: String,
    priority: i32,
}

impl Entity for Ticket {
    const TABLE: &'static str = "tickets";
    const DEFAULT_ORDER: Option<&'static str> = Some("id ASC");

    fn columns() -> Vec<Column> {
        vec![
            Column::new("id", ColumnType::BigSerial).primary_key(),
            Column::new("status", ColumnType::Text).not_null().index(),
            Column::new("priority", ColumnType::Integer).not_null(),
        ]
    }

    fn values(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("id", self.id.into()),
            ("status", self.status.clone().into()),
            ("priority", self.priority.into()),
        ]
    }

    fn primary_key(&self) -> SqlValue {
        self.id.into()
    }
}

fn filter_with(conditions: &[String]) -> Filter {
    let expr = conditions
        .iter()
        .map(|c| format!("{} = ?", c))
        .collect::<Vec<_>>()
        .join(" AND ");
    conditions
        .iter()
        .enumerate()
        .fold(Filter::new(expr), |f, (i, _)| f.bind(i as i64))
}

// Placeholders are numbered left to right starting at $1, and no bare `?`
// survives in the statement text.
#[test]
fn property_placeholders_are_numbered_in_order() {
    proptest!(|(columns in prop::collection::vec("[a-z]{1,8}", 1..8))| {
        let filter = filter_with(&columns);
        let builder = sql::select_where::<Ticket>(&filter).unwrap();
        let statement = builder.sql();

        prop_assert!(!statement.contains('?'));
        let mut cursor = 0;
        for n in 1..=columns.len() {
            let marker = format!("${}", n);
            let found = statement[cursor..].find(&marker);
            prop_assert!(found.is_some(), "missing {} in {}", marker, statement);
            cursor += found.unwrap() + marker.len();
        }
        let next = format!("${}", columns.len() + 1);
        prop_assert!(!statement.contains(&next));
    });
}

// Any disagreement between placeholders and bound arguments is rejected
// before a statement is produced.
#[test]
fn property_argument_count_mismatch_is_invalid_filter() {
    proptest!(|(placeholders in 0usize..6, args in 0usize..6)| {
        prop_assume!(placeholders != args);

        let expr = std::iter::repeat("x = ?")
            .take(placeholders)
            .chain(std::iter::once("TRUE"))
            .collect::<Vec<_>>()
            .join(" AND ");
        let filter = (0..args).fold(Filter::new(expr), |f, i| f.bind(i as i32));

        let result = sql::count::<Ticket>(Some(&filter));
        prop_assert!(matches!(result, Err(DatabaseError::InvalidFilter(_))));
    });
}

// Question marks inside string literals are data, not placeholders.
#[test]
fn property_quoted_question_marks_are_not_placeholders() {
    proptest!(|(prefix in "[a-z ]{0,6}", suffix in "[a-z ]{0,6}")| {
        let literal = format!("'{}?{}'", prefix, suffix);
        let filter = Filter::new(format!("status = {} OR priority = ?", literal)).bind(1i32);

        prop_assert_eq!(filter.placeholder_count(), 1);
        let builder = sql::select_where::<Ticket>(&filter).unwrap();
        prop_assert!(builder.sql().contains(&literal));
        prop_assert!(builder.sql().contains("priority = $1"));
    });
}

// Offset follows (page - 1) * page_size for every page, including the
// unguarded page < 1 case.
#[test]
fn property_pagination_offset() {
    proptest!(|(page in -5i64..1000, page_size in 1i64..500)| {
        let offset = sql::offset(page, page_size);
        prop_assert_eq!(offset, (page - 1) * page_size);
        if page >= 1 {
            prop_assert!(offset >= 0);
            prop_assert_eq!(offset % page_size, 0);
        } else {
            prop_assert!(offset < 0);
        }
    });
}

// LIMIT and OFFSET are bound after the filter arguments, and the default
// order is applied before paging.
#[test]
fn property_paginate_binds_follow_filter_arguments() {
    proptest!(|(
        columns in prop::collection::vec("[a-z]{1,8}", 0..5),
        page in 1i64..50,
        page_size in 1i64..100
    )| {
        let filter = (!columns.is_empty()).then(|| filter_with(&columns));
        let builder = sql::paginate::<Ticket>(page, page_size, filter.as_ref()).unwrap();
        let statement = builder.sql();

        let limit = format!("LIMIT ${} OFFSET ${}", columns.len() + 1, columns.len() + 2);
        prop_assert!(statement.ends_with(&limit), "{}", statement);
        let order = statement.find("ORDER BY id ASC");
        prop_assert!(order.is_some());
        prop_assert!(order.unwrap() < statement.find("LIMIT").unwrap());
    });
}

// The DSN lists every field in a fixed order and the redacted form never
// leaks the password.
#[test]
fn property_dsn_rendering() {
    proptest!(|(
        host in "[a-z][a-z0-9.-]{0,20}",
        port in 1u16..=u16::MAX,
        user in "[a-z][a-z0-9_]{0,15}",
        password in "[A-Za-z0-9!@#%^&*]{6,24}",
        database_name in "[a-z][a-z0-9_]{0,15}"
    )| {
        let config = Config {
            host: host.clone(),
            port: port.to_string(),
            user: user.clone(),
            password: password.clone(),
            database_name: database_name.clone(),
            ..Config::default()
        };

        let expected = format!(
            "host={} port={} user={} password={} dbname={} sslmode=disable TimeZone=UTC",
            host, port, user, password, database_name
        );
        prop_assert_eq!(config.dsn(), expected);

        let redacted = config.redacted_dsn();
        prop_assert!(redacted.contains("password=***"));
        let plain_password = format!("password={}", password);
        prop_assert!(!redacted.contains(&plain_password));

        prop_assert!(config.validate().is_ok());
        prop_assert!(config.connect_options().is_ok());
    });
}
