//! Pluggable protocol discriminators over header-cache bytes (component
//! C4). Discriminators are tried every tick until one affirms or all deny.

pub mod spice;

use std::collections::HashMap;

use serde_json::Value;

/// Outcome of one discriminator invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The protocol is confirmed; `properties()` is final.
    Affirm,
    /// Not enough information yet; wait for more bytes.
    Uncertainty,
    /// The protocol is confirmed but properties aren't complete yet.
    Incomplete,
    /// This discriminator's protocol has been ruled out.
    Deny,
}

/// A pluggable protocol-recognition component. `client`/`server` are the
/// two header-cache byte slices; on the server endpoint these are swapped
/// relative to the client endpoint's orientation (see the classifier's
/// caller).
pub trait Discriminator: Send + Sync {
    fn name(&self) -> &'static str;
    fn analyze_header(&mut self, client: &[u8], server: &[u8]) -> Outcome;
    fn properties(&self) -> Value;
}

pub fn builtin_discriminators() -> Vec<Box<dyn Discriminator>> {
    vec![Box::new(spice::SpiceDiscriminator::default())]
}

/// Confirmed or tentative classification result for a tunnel.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub protocol: Option<String>,
    pub properties: Option<Value>,
}

/// Runs the surviving discriminators against the current header caches and
/// applies the transition policy from the classifier's design: DENY
/// removes a discriminator, AFFIRM is terminal, INCOMPLETE updates the
/// tentative classification but keeps the discriminator alive, UNCERTAINTY
/// changes nothing.
pub struct Classifier {
    discriminators: HashMap<&'static str, Box<dyn Discriminator>>,
}

impl Classifier {
    pub fn new(discriminators: Vec<Box<dyn Discriminator>>) -> Self {
        Self {
            discriminators: discriminators.into_iter().map(|d| (d.name(), d)).collect(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.discriminators.is_empty()
    }

    /// One tick of analysis. Returns `Some(classification)` once affirmed
    /// or newly tentative; `None` when nothing changed this tick.
    pub fn tick(&mut self, client: &[u8], server: &[u8]) -> Option<(bool, Classification)> {
        let mut denied = Vec::new();
        let mut result = None;

        for (name, disc) in self.discriminators.iter_mut() {
            match disc.analyze_header(client, server) {
                Outcome::Deny => denied.push(*name),
                Outcome::Affirm => {
                    result = Some((
                        true,
                        Classification {
                            protocol: Some((*name).to_owned()),
                            properties: Some(disc.properties()),
                        },
                    ));
                    break;
                }
                Outcome::Incomplete => {
                    result = Some((
                        false,
                        Classification {
                            protocol: Some((*name).to_owned()),
                            properties: Some(disc.properties()),
                        },
                    ));
                }
                Outcome::Uncertainty => {}
            }
        }

        for name in denied {
            self.discriminators.remove(name);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysDeny;
    impl Discriminator for AlwaysDeny {
        fn name(&self) -> &'static str {
            "always-deny"
        }
        fn analyze_header(&mut self, _client: &[u8], _server: &[u8]) -> Outcome {
            Outcome::Deny
        }
        fn properties(&self) -> Value {
            Value::Null
        }
    }

    #[test]
    fn deny_removes_discriminator_and_empties_map() {
        let mut classifier = Classifier::new(vec![Box::new(AlwaysDeny)]);
        assert!(classifier.tick(b"", b"").is_none());
        assert!(classifier.is_exhausted());
    }
}
