//! RPC client used by the Dispatcher and by workers registering with the
//! master. Each call carries its own deadline — liveness probes, health
//! checks, dispatch, and registration all have different latency budgets.
//! No request is retried by this layer — the Dispatcher's peer-switch loop
//! is the only retry behavior in the system.

use std::time::Duration;

use reqwest::Client;

use super::wire::{
    CreateTopicRequest, CreateTopicResponse, GetNextInstanceResponse, ReceiveMessageRequest,
    ReceiveMessageResponse, RegisterMomInstanceRequest, RegisterMomInstanceResponse,
    SendMessageRequest, SendMessageResponse,
};
use crate::error::{BrokerError, Result};

const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;
const MSGPACK_CONTENT_TYPE: &str = "application/msgpack";

/// Thin HTTP/MessagePack client over the RPC surface exposed by
/// [`crate::rpc::server`]. One instance is shared across the process.
pub struct RpcClient {
    http: Client,
}

impl RpcClient {
    #[must_use]
    pub fn new() -> Self {
        let http = Client::builder()
            .tcp_keepalive(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(1))
            .build()
            .expect("reqwest client configuration is always valid");
        Self { http }
    }

    async fn post_msgpack<Req: serde::Serialize, Resp: serde::de::DeserializeOwned>(
        &self,
        address: &str,
        path: &str,
        body: &Req,
        deadline: Duration,
    ) -> Result<Resp> {
        let payload = rmp_serde::to_vec(body)?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(BrokerError::Internal("message exceeds max size".to_string()));
        }

        let response = self
            .http
            .post(format!("http://{address}{path}"))
            .header("content-type", MSGPACK_CONTENT_TYPE)
            .timeout(deadline)
            .body(payload)
            .send()
            .await
            .map_err(|e| BrokerError::Unreachable(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BrokerError::Unreachable(e.to_string()))?;

        Ok(rmp_serde::from_slice(&bytes)?)
    }

    pub async fn register_mom_instance(
        &self,
        master_address: &str,
        node_name: &str,
        hostname: &str,
        port: u16,
        deadline: Duration,
    ) -> Result<RegisterMomInstanceResponse> {
        let req = RegisterMomInstanceRequest {
            node_name: node_name.to_string(),
            hostname: hostname.to_string(),
            port,
        };
        self.post_msgpack(master_address, "/rpc/register", &req, deadline)
            .await
    }

    pub async fn get_next_instance(
        &self,
        master_address: &str,
        deadline: Duration,
    ) -> Result<GetNextInstanceResponse> {
        self.post_msgpack(master_address, "/rpc/get-next-instance", &(), deadline)
            .await
    }

    pub async fn send_message(
        &self,
        worker_address: &str,
        topic: &str,
        message: &str,
        deadline: Duration,
    ) -> Result<SendMessageResponse> {
        let req = SendMessageRequest {
            topic: topic.to_string(),
            message: message.to_string(),
        };
        self.post_msgpack(worker_address, "/rpc/send", &req, deadline)
            .await
    }

    pub async fn receive_message(
        &self,
        worker_address: &str,
        topic: &str,
        deadline: Duration,
    ) -> Result<ReceiveMessageResponse> {
        let req = ReceiveMessageRequest {
            topic: topic.to_string(),
        };
        self.post_msgpack(worker_address, "/rpc/receive", &req, deadline)
            .await
    }

    pub async fn create_topic(
        &self,
        worker_address: &str,
        topic_name: &str,
        partitions: u32,
        deadline: Duration,
    ) -> Result<CreateTopicResponse> {
        let req = CreateTopicRequest {
            topic_name: topic_name.to_string(),
            partitions,
        };
        self.post_msgpack(worker_address, "/rpc/create-topic", &req, deadline)
            .await
    }
}

impl Default for RpcClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_with_default_pool_settings() {
        let _client = RpcClient::new();
    }

    #[tokio::test]
    async fn send_message_to_unreachable_address_surfaces_unreachable() {
        let client = RpcClient::new();
        let err = client
            .send_message("127.0.0.1:1", "t", "m", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Unreachable(_)));
    }
}
