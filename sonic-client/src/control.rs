//! # Control Channel
//!
//! Purpose: Administrative commands, currently `TRIGGER <action>`.

use sonic_common::{expect_reply, Action, Arg, Channel, SonicResult};

use crate::client::{ClientConfig, PooledClient};

/// Client for the `control` channel.
#[derive(Clone)]
pub struct ControlClient {
    client: PooledClient,
}

impl ControlClient {
    /// Opens a control pool using `config`.
    pub fn connect(config: &ClientConfig) -> SonicResult<Self> {
        let client = PooledClient::connect(config, Channel::Control)?;
        Ok(ControlClient { client })
    }

    /// Triggers a server action and waits for `OK`.
    pub fn trigger(&self, action: Action) -> SonicResult<()> {
        let mut driver = self.client.driver()?;
        let reply = driver.exec("TRIGGER", &[Arg::Word(action.as_str())])?;
        expect_reply(&reply, "OK")
    }

    /// Triggers an action given by name; unknown names are rejected before
    /// any connection is used.
    pub fn trigger_named(&self, name: &str) -> SonicResult<()> {
        self.trigger(name.parse()?)
    }

    pub fn ping(&self) -> SonicResult<()> {
        self.client.ping()
    }

    /// Quits all pooled connections.
    pub fn quit(&self) -> SonicResult<()> {
        self.client.quit()
    }

    pub fn client(&self) -> &PooledClient {
        &self.client
    }
}
