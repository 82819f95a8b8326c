//! Capability registry.
//!
//! A capability is one named operation a session may invoke: a typed input
//! (described by a schemars-generated JSON Schema and validated by serde
//! deserialization) and an async handler that performs one external database
//! call. The registry is built once at startup and never mutated afterwards,
//! so sessions share it through an `Arc` without locking.

use crate::error::{BridgeError, BridgeResult};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Public description of one capability, serialized for `capabilities/list`.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema for the `arguments` object.
    pub input_schema: JsonValue,
}

type HandlerFn = Box<dyn Fn(JsonValue) -> BoxFuture<'static, BridgeResult<JsonValue>> + Send + Sync>;

struct Capability {
    descriptor: CapabilityDescriptor,
    handler: HandlerFn,
}

/// The set of operations exposed to sessions. Immutable after construction.
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Capability>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            capabilities: HashMap::new(),
        }
    }

    /// Register one capability.
    ///
    /// The input schema is generated from `I`; raw arguments are validated
    /// by deserializing into `I` before the handler runs. Fails with
    /// `DuplicateCapability` if `name` is already taken — a startup-time
    /// configuration error the caller should treat as fatal.
    pub fn register<I, F, Fut>(
        &mut self,
        name: &str,
        description: &str,
        handler: F,
    ) -> BridgeResult<()>
    where
        I: DeserializeOwned + JsonSchema + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BridgeResult<JsonValue>> + Send + 'static,
    {
        if self.capabilities.contains_key(name) {
            return Err(BridgeError::duplicate_capability(name));
        }

        let input_schema = serde_json::to_value(schemars::schema_for!(I)).map_err(|e| {
            BridgeError::internal(format!("Failed to build schema for '{}': {}", name, e))
        })?;

        let wrapped: HandlerFn = Box::new(move |raw: JsonValue| {
            match serde_json::from_value::<I>(raw) {
                Err(e) => std::future::ready(Err(BridgeError::invalid_input(format!(
                    "Arguments do not match the capability's input schema: {}",
                    e
                ))))
                .boxed(),
                // A panicking handler must not take the session down with it
                Ok(input) => AssertUnwindSafe(handler(input))
                    .catch_unwind()
                    .map(|outcome| match outcome {
                        Ok(result) => result,
                        Err(_) => {
                            Err(BridgeError::capability_execution("Capability handler panicked"))
                        }
                    })
                    .boxed(),
            }
        });

        self.capabilities.insert(
            name.to_string(),
            Capability {
                descriptor: CapabilityDescriptor {
                    name: name.to_string(),
                    description: description.to_string(),
                    input_schema,
                },
                handler: wrapped,
            },
        );

        Ok(())
    }

    /// Descriptors of every registered capability, sorted by name.
    pub fn list(&self) -> Vec<CapabilityDescriptor> {
        let mut descriptors: Vec<_> = self
            .capabilities
            .values()
            .map(|c| c.descriptor.clone())
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Number of registered capabilities.
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Invoke a capability with raw JSON arguments.
    ///
    /// Input validation failures surface as `InvalidInput`; any other
    /// handler failure is wrapped as `CapabilityExecution` carrying the
    /// underlying message, so callers see a uniform error regardless of what
    /// went wrong inside the handler.
    pub async fn invoke(&self, name: &str, arguments: JsonValue) -> BridgeResult<JsonValue> {
        let capability = self
            .capabilities
            .get(name)
            .ok_or_else(|| BridgeError::capability_not_found(name))?;

        match (capability.handler)(arguments).await {
            Ok(result) => Ok(result),
            Err(err @ BridgeError::InvalidInput { .. }) => Err(err),
            Err(err) => Err(BridgeError::capability_execution(err.to_string())),
        }
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
