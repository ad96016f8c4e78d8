//! User query builders.

use sea_query::{Expr, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::Users;
use crate::store::NewUser;

/// Columns selected for a full [`crate::store::User`], in row order.
pub const USER_COLUMNS: [Users; 6] = [
    Users::Id,
    Users::Email,
    Users::PasswordDigest,
    Users::InviteCodeId,
    Users::CreatedAt,
    Users::UpdatedAt,
];

pub fn get_by_email(email: &str) -> Built {
    Query::select()
        .columns(USER_COLUMNS)
        .from(Users::Table)
        .and_where(Expr::col(Users::Email).eq(email))
        .build(SqliteQueryBuilder)
}

pub fn get_by_id(id: i64) -> Built {
    Query::select()
        .columns(USER_COLUMNS)
        .from(Users::Table)
        .and_where(Expr::col(Users::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// Id only; used for the existence check inside registration.
pub fn id_by_email(email: &str) -> Built {
    Query::select()
        .column(Users::Id)
        .from(Users::Table)
        .and_where(Expr::col(Users::Email).eq(email))
        .build(SqliteQueryBuilder)
}

pub fn insert(user: NewUser<'_>) -> Built {
    Query::insert()
        .into_table(Users::Table)
        .columns([Users::Email, Users::PasswordDigest, Users::InviteCodeId])
        .values_panic([
            user.email.into(),
            user.password_digest.into(),
            user.invite_code_id.into(),
        ])
        .build(SqliteQueryBuilder)
}
