//! Connection configuration.

use serde::Deserialize;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 27017;
pub const DEFAULT_COUNTERS_COLLECTION: &str = "counters";

/// How [`Connection::next_sequence`](crate::Connection::next_sequence)
/// produces auto-increment values.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SequenceStrategy {
    /// One atomic `findAndModify` with upsert. Safe under concurrent writers.
    #[default]
    FindAndModify,
    /// An upserting `$inc` on the document holding the counter, followed by a
    /// separate read. Two round trips; two writers racing on the same name
    /// can read each other's increment.
    UpsertThenRead,
}

/// Options for [`Connection::init`](crate::Connection::init).
///
/// Deserializes from any serde format; missing keys take their defaults.
///
/// ```
/// # use tamarind::ConnectionOptions;
/// let options = ConnectionOptions::new().db("blog").port(27018);
/// assert_eq!(options.uri(), "mongodb://localhost:27018");
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectionOptions {
    pub host: String,
    pub port: u16,
    /// Unix socket path or `host:port` pair. Takes precedence over
    /// `host`/`port`.
    pub socket: Option<String>,
    /// Database to select. Falls back to the default database of the
    /// connection string.
    pub db: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Verify the server with a `ping` while initializing.
    pub connect: bool,
    /// Collection holding the sequence counters. Per-name counter documents
    /// such as the ones kept in `sequences` are only followed by
    /// [`SequenceStrategy::UpsertThenRead`].
    pub counters_collection: String,
    pub sequence_strategy: SequenceStrategy,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            socket: None,
            db: None,
            username: None,
            password: None,
            connect: true,
            counters_collection: DEFAULT_COUNTERS_COLLECTION.to_owned(),
            sequence_strategy: SequenceStrategy::default(),
        }
    }
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn socket(mut self, socket: impl Into<String>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    pub fn db(mut self, db: impl Into<String>) -> Self {
        self.db = Some(db.into());
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn connect(mut self, connect: bool) -> Self {
        self.connect = connect;
        self
    }

    pub fn counters_collection(mut self, name: impl Into<String>) -> Self {
        self.counters_collection = name.into();
        self
    }

    pub fn sequence_strategy(mut self, strategy: SequenceStrategy) -> Self {
        self.sequence_strategy = strategy;
        self
    }

    /// The connection string the client is opened with.
    pub fn uri(&self) -> String {
        match &self.socket {
            // socket paths must be percent-encoded inside the host part
            Some(socket) => format!("mongodb://{}", socket.replace('/', "%2F")),
            None => format!("mongodb://{}:{}", self.host, self.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = ConnectionOptions::default();

        assert_eq!(options.host, "localhost");
        assert_eq!(options.port, 27017);
        assert!(options.connect);
        assert_eq!(options.counters_collection, "counters");
        assert_eq!(options.sequence_strategy, SequenceStrategy::FindAndModify);
        assert_eq!(options.uri(), "mongodb://localhost:27017");
    }

    #[test]
    fn socket_takes_precedence() {
        let options = ConnectionOptions::new()
            .host("db.internal")
            .socket("/tmp/mongodb-27017.sock");

        assert_eq!(options.uri(), "mongodb://%2Ftmp%2Fmongodb-27017.sock");
    }

    #[test]
    fn deserializes_partial_config() {
        let options: ConnectionOptions = serde_json::from_str(
            r#"{
                "db": "blog",
                "port": 27018,
                "counters_collection": "sequences",
                "sequence_strategy": "upsert_then_read"
            }"#,
        )
        .unwrap();

        assert_eq!(options.db.as_deref(), Some("blog"));
        assert_eq!(options.host, "localhost");
        assert_eq!(options.port, 27018);
        assert_eq!(options.counters_collection, "sequences");
        assert_eq!(options.sequence_strategy, SequenceStrategy::UpsertThenRead);
    }
}
