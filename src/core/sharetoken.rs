use serde::{Deserialize, Serialize};

use crate::core::token::{KeyStrategy, KeyTriple, Token};

/// Sharetoken：relay 向服务合约结算的凭证。
///
/// 结算窗口 `[settlement_open, settlement_close]` 以 unix 秒表示，两端闭区间。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareToken {
    /// 服务合约 id
    pub contract: String,
    /// 接收该 token 的 relay 公钥
    pub relay_pubkey: String,
    /// token 签发方公钥
    pub public_key: String,
    pub signature: String,
    pub settlement_open: i64,
    pub settlement_close: i64,
}

impl Token for ShareToken {
    fn is_settling_at(&self, unix_secs: i64) -> bool {
        self.settlement_open <= unix_secs && unix_secs <= self.settlement_close
    }
}

/// 默认 key 策略：(合约, relay 公钥, 签名)。
///
/// 磁盘布局因此为 `<contract>/<signature>.json`，relay 维度只存在于内存。
#[derive(Clone, Copy, Debug, Default)]
pub struct ContractRelayKeys;

impl KeyStrategy<ShareToken> for ContractRelayKeys {
    fn keys(&self, st: &ShareToken) -> KeyTriple {
        KeyTriple::new(&st.contract, &st.relay_pubkey, &st.signature)
    }
}
