/// Router Module Index
///
/// Splits the routes by access level. Permission checks live on the handlers themselves
/// (`Authorized<P>` arguments), so the split documents intent rather than applying a layer.

/// Routes accessible to anonymous clients.
pub mod public;

/// Routes whose handlers require a bearer token carrying a specific permission.
pub mod authenticated;
