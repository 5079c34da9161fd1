/// Router Module Index
///
/// Splits the API by access level. The authentication and admin checks are applied
/// as route layers in `create_router`, so a route cannot be exposed without its gate
/// by landing in the wrong handler.

/// Routes open to anonymous clients.
pub mod public;

/// Routes requiring a valid bearer token.
pub mod authenticated;

/// Routes requiring a valid token whose stored user has the "admin" role.
pub mod admin;
