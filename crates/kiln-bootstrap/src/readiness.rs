use std::path::PathBuf;

use async_trait::async_trait;

use crate::{Readiness, ReadinessCheck};

pub const DEFAULT_SYS_CLASS_NET: &str = "/sys/class/net";

/// Local hypervisor readiness: the bridge interface must exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeReadinessCheck {
    interface: String,
    sys_class_net: PathBuf,
}

impl BridgeReadinessCheck {
    pub fn new(interface: impl Into<String>) -> Self {
        Self::with_sys_class_net(interface, DEFAULT_SYS_CLASS_NET)
    }

    pub fn with_sys_class_net(
        interface: impl Into<String>,
        sys_class_net: impl Into<PathBuf>,
    ) -> Self {
        Self {
            interface: interface.into(),
            sys_class_net: sys_class_net.into(),
        }
    }

    pub fn remediation(&self) -> String {
        format!(
            "The network bridge '{bridge}' is not configured. Run `lxd init` and create the \
             bridge (for example `lxc network create {bridge}`), then start again.",
            bridge = self.interface
        )
    }
}

#[async_trait]
impl ReadinessCheck for BridgeReadinessCheck {
    async fn check_ready(&self) -> Readiness {
        let path = self.sys_class_net.join(&self.interface);
        let present = tokio::fs::try_exists(&path).await.unwrap_or(false);
        tracing::debug!(
            bridge = %self.interface,
            path = %path.display(),
            present,
            "bridge readiness"
        );
        if present {
            Readiness::ready()
        } else {
            Readiness::not_ready(self.remediation())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BridgeReadinessCheck;
    use crate::ReadinessCheck;

    #[tokio::test]
    async fn functional_present_bridge_is_ready() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(tempdir.path().join("lxdbr0")).expect("fake interface");
        let check = BridgeReadinessCheck::with_sys_class_net("lxdbr0", tempdir.path());

        let readiness = check.check_ready().await;

        assert!(readiness.ready);
        assert!(readiness.message.is_empty());
    }

    #[tokio::test]
    async fn functional_missing_bridge_names_remediation() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let check = BridgeReadinessCheck::with_sys_class_net("lxdbr0", tempdir.path());

        let readiness = check.check_ready().await;

        assert!(!readiness.ready);
        assert!(readiness.message.contains("'lxdbr0'"));
        assert!(readiness.message.contains("lxd init"));
    }
}
