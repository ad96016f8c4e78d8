//! Compile-time–checked column identifiers for all tables.

use sea_query::Iden;

#[derive(Iden)]
pub enum Users {
    Table,
    Id,
    Email,
    PasswordDigest,
    InviteCodeId,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum InviteCodes {
    Table,
    Id,
    Code,
    IsActive,
    CreatedAt,
}
