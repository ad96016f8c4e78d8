pub mod client;
pub mod runner;
pub mod specs;

/// Invoke `$mac!(module::name)` for every E2E spec.
///
/// This is the **single source of truth** for the spec list. Adding a new spec
/// here automatically registers it in `runner::run_all` and `tests/server.rs`.
#[macro_export]
macro_rules! for_each_spec {
    ($mac:ident) => {
        // health (1)
        $mac!(health::health_check);

        // registration (5)
        $mac!(auth::register_without_invite_code);
        $mac!(auth::register_duplicate_email);
        $mac!(auth::register_unknown_invite_code);
        $mac!(auth::register_invalid_input);
        $mac!(auth::register_concurrently_with_default_code);

        // login (3)
        $mac!(auth::login_sets_session_cookie);
        $mac!(auth::login_failures_are_indistinguishable);
        $mac!(auth::login_invalid_input);

        // sessions (5)
        $mac!(sessions::me_anonymous);
        $mac!(sessions::me_with_unknown_token);
        $mac!(sessions::me_after_login);
        $mac!(sessions::logout_revokes_token);
        $mac!(sessions::logout_without_session);
    };
}
