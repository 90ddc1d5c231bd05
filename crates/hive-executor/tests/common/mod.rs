#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use hive_bridge::Session;
use hive_channel::memory_pair;
use hive_executor::{MemoryEngine, Router};
use hive_types::{BridgeConfig, HiveError, SessionId};
use serde_json::Value;
use tokio::task::JoinHandle;

/// A controller session wired to an in-process executor over a memory
/// channel.
pub struct Connected {
    pub session: Session,
    pub executor: JoinHandle<Result<(), HiveError>>,
}

pub fn connect(engine: MemoryEngine) -> Connected {
    let config = BridgeConfig {
        request_timeout_secs: 5,
        ..BridgeConfig::default()
    };
    let (controller, executor) = memory_pair();
    let id = SessionId::new("hive-test");
    let router = Router::new(id.clone(), engine, executor.channel);
    let executor = tokio::spawn(router.run(executor.inbound));
    let session = Session::attach(id, controller, &config);
    Connected { session, executor }
}

/// Collects the arguments of every event delivered to it.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Vec<Value>>>>);

impl Recorder {
    pub fn listener(&self) -> impl Fn(&[Value]) + Send + Sync + 'static {
        let calls = Arc::clone(&self.0);
        move |args: &[Value]| calls.lock().unwrap().push(args.to_vec())
    }

    pub fn calls(&self) -> Vec<Vec<Value>> {
        self.0.lock().unwrap().clone()
    }
}
