pub mod server;
pub mod session;
pub mod usage;
pub mod user;

use sqlx::Type;
use strum::Display;

/// Tunneling protocols understood by the relay fleet.
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize, Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Protocol {
    HttpInject,
    SshDirect,
    SshSsl,
    SshUdp,
    SslTls,
    V2rayVmess,
    V2rayVless,
    Shadowsocks,
    Trojan,
    Wireguard,
    Openvpn,
}
