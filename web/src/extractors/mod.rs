pub(crate) mod authenticated_identity;
