use bytes::Bytes;

/// Decides whether a CONNECT may proceed.
///
/// A missing user name is passed as `""` and a missing password as an empty slice.
pub trait CredentialCheck: Send + Sync {
    fn check(&self, user_name: &str, password: &[u8]) -> bool;
}

impl<F> CredentialCheck for F
where
    F: Fn(&str, &[u8]) -> bool + Send + Sync,
{
    fn check(&self, user_name: &str, password: &[u8]) -> bool {
        self(user_name, password)
    }
}

/// Accepts every CONNECT.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAnonymous;

impl CredentialCheck for AllowAnonymous {
    fn check(&self, _user_name: &str, _password: &[u8]) -> bool {
        true
    }
}

/// Accepts a single user name and password pair.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    user_name: String,
    password: Bytes,
}

impl StaticCredentials {
    pub fn new(user_name: impl Into<String>, password: impl Into<Bytes>) -> Self {
        Self { user_name: user_name.into(), password: password.into() }
    }
}

impl CredentialCheck for StaticCredentials {
    fn check(&self, user_name: &str, password: &[u8]) -> bool {
        self.user_name == user_name && self.password.as_ref() == password
    }
}
