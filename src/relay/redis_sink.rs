//! Redis pub/sub sink.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig, MultiplexedConnection};
use redis::cluster::ClusterClientBuilder;
use redis::cluster_async::ClusterConnection;
use redis::sentinel::{SentinelClient, SentinelNodeConnectionInfo, SentinelServerType};
use redis::{
    AsyncConnectionConfig, ConnectionInfo, FromRedisValue, IntoConnectionInfo, RedisConnectionInfo,
    RedisResult,
};
use tracing::info;

use super::EventSink;
use crate::config::{RedisTopology, RelayConfig};
use crate::error::RelayError;

#[derive(Clone)]
enum Connection {
    Single(ConnectionManager),
    Cluster(ClusterConnection),
    Sentinel(MultiplexedConnection),
}

/// Publishes events with `PUBLISH channel payload` on a single Redis node,
/// a Redis cluster, or the master behind a set of sentinels.
///
/// The connection is opened and checked with `PING` once, in
/// [`RedisSink::connect`]. Every connection kind is cheap to clone and
/// multiplexes concurrent commands.
#[derive(Clone)]
pub struct RedisSink {
    connection: Connection,
    target: String,
    write_timeout: Duration,
}

impl fmt::Debug for RedisSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisSink")
            .field("target", &self.target)
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisSink {
    /// Connects to the configured Redis topology and verifies it answers.
    ///
    /// Sentinel addresses take precedence over cluster addresses, which
    /// take precedence over the single-node address.
    ///
    /// # Errors
    ///
    /// Returns a [`RelayError`] if an address is invalid, the connection
    /// cannot be established within the dial timeout, or `PING` fails.
    pub async fn connect(config: &RelayConfig) -> Result<Self, RelayError> {
        let dial_timeout = Duration::from_millis(config.dial_timeout_ms);
        let read_timeout = config.read_timeout_ms.map(Duration::from_millis);

        let (connection, target) = match config.topology() {
            RedisTopology::Single { address } => {
                info!(address, db = config.db, "connecting to redis");

                let mut info = node_info(address)?;
                info.redis = credentials(config);
                let client = redis::Client::open(info)?;

                let mut manager_config =
                    ConnectionManagerConfig::new().set_connection_timeout(dial_timeout);
                if let Some(limit) = read_timeout {
                    manager_config = manager_config.set_response_timeout(limit);
                }
                let manager = bounded(
                    "connect",
                    dial_timeout,
                    ConnectionManager::new_with_config(client, manager_config),
                )
                .await??;
                (Connection::Single(manager), address.to_string())
            }
            RedisTopology::Cluster { addresses } => {
                info!(nodes = ?addresses, "connecting to redis cluster");

                let nodes = addresses.iter().map(|node| format!("redis://{node}"));
                // The retry budget covers MOVED/ASK redirects and also
                // transient node errors inside one publish. The write
                // timeout bounds the whole call either way.
                let mut builder = ClusterClientBuilder::new(nodes)
                    .retries(config.cluster_max_redirects)
                    .connection_timeout(dial_timeout);
                if let Some(limit) = read_timeout {
                    builder = builder.response_timeout(limit);
                }
                if let Some(username) = &config.username {
                    builder = builder.username(username.clone());
                }
                if let Some(password) = &config.password {
                    builder = builder.password(password.clone());
                }
                let client = builder.build()?;

                let cluster =
                    bounded("connect", dial_timeout, client.get_async_connection()).await??;
                (Connection::Cluster(cluster), addresses.join(","))
            }
            RedisTopology::Sentinel {
                addresses,
                master_name,
            } => {
                info!(
                    sentinels = ?addresses,
                    master = master_name,
                    "connecting to redis via sentinel"
                );

                let sentinels = addresses
                    .iter()
                    .map(|node| -> RedisResult<ConnectionInfo> {
                        let mut info = node_info(node)?;
                        info.redis.username.clone_from(&config.sentinel_username);
                        info.redis.password.clone_from(&config.sentinel_password);
                        Ok(info)
                    })
                    .collect::<RedisResult<Vec<_>>>()?;
                let master = SentinelNodeConnectionInfo {
                    tls_mode: None,
                    redis_connection_info: Some(credentials(config)),
                };
                let mut client = SentinelClient::build(
                    sentinels,
                    master_name.to_string(),
                    Some(master),
                    SentinelServerType::Master,
                )?;

                let mut connection_config =
                    AsyncConnectionConfig::new().set_connection_timeout(dial_timeout);
                if let Some(limit) = read_timeout {
                    connection_config = connection_config.set_response_timeout(limit);
                }
                let connection = bounded(
                    "connect",
                    dial_timeout,
                    client.get_async_connection_with_config(&connection_config),
                )
                .await??;
                (
                    Connection::Sentinel(connection),
                    format!("{master_name}@{}", addresses.join(",")),
                )
            }
        };

        let sink = Self {
            connection,
            target,
            write_timeout: Duration::from_millis(config.write_timeout_ms),
        };

        let pong: String = bounded(
            "ping",
            read_timeout.unwrap_or(dial_timeout),
            sink.query(redis::cmd("PING")),
        )
        .await??;
        info!(redis = %sink.target, reply = %pong, "redis relay connected");

        Ok(sink)
    }

    async fn query<T: FromRedisValue>(&self, cmd: redis::Cmd) -> RedisResult<T> {
        match &self.connection {
            Connection::Single(manager) => {
                let mut conn = manager.clone();
                cmd.query_async(&mut conn).await
            }
            Connection::Cluster(cluster) => {
                let mut conn = cluster.clone();
                cmd.query_async(&mut conn).await
            }
            Connection::Sentinel(master) => {
                let mut conn = master.clone();
                cmd.query_async(&mut conn).await
            }
        }
    }
}

fn node_info(address: &str) -> RedisResult<ConnectionInfo> {
    format!("redis://{address}").into_connection_info()
}

/// Database and ACL credentials for the data node.
fn credentials(config: &RelayConfig) -> RedisConnectionInfo {
    RedisConnectionInfo {
        db: config.db,
        username: config.username.clone(),
        password: config.password.clone(),
        ..RedisConnectionInfo::default()
    }
}

#[async_trait]
impl EventSink for RedisSink {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), RelayError> {
        let mut cmd = redis::cmd("PUBLISH");
        cmd.arg(channel).arg(payload);
        let _receivers: i64 = bounded("publish", self.write_timeout, self.query(cmd)).await??;
        Ok(())
    }
}

/// Runs `fut` with a deadline, mapping the elapsed case to
/// [`RelayError::Timeout`].
async fn bounded<F: Future>(
    operation: &'static str,
    limit: Duration,
    fut: F,
) -> Result<F::Output, RelayError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| RelayError::Timeout {
            operation,
            after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        })
}
