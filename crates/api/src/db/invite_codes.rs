//! Invite code query builders.

use sea_query::{Expr, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::InviteCodes;

/// Id of an active code.
pub fn active_id_by_code(code: &str) -> Built {
    Query::select()
        .column(InviteCodes::Id)
        .from(InviteCodes::Table)
        .and_where(Expr::col(InviteCodes::Code).eq(code))
        .and_where(Expr::col(InviteCodes::IsActive).eq(true))
        .build(SqliteQueryBuilder)
}

/// Id of a code regardless of `is_active`.
pub fn id_by_code(code: &str) -> Built {
    Query::select()
        .column(InviteCodes::Id)
        .from(InviteCodes::Table)
        .and_where(Expr::col(InviteCodes::Code).eq(code))
        .build(SqliteQueryBuilder)
}

pub fn insert(code: &str) -> Built {
    Query::insert()
        .into_table(InviteCodes::Table)
        .columns([InviteCodes::Code, InviteCodes::IsActive])
        .values_panic([code.into(), true.into()])
        .build(SqliteQueryBuilder)
}
