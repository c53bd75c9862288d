// ABOUTME: SSH container helper for integration tests.
// ABOUTME: Uses bollard to run one password-auth openssh-server shared by a test binary.

use bollard::Docker;
use bollard::models::{ContainerCreateBody, HostConfig, PortBinding};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, RemoveContainerOptions, StartContainerOptions,
};
use futures::StreamExt;
use sshpool::ssh::Credential;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::OnceCell;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const IMAGE: &str = "lscr.io/linuxserver/openssh-server:latest";
/// Port sshd listens on inside the container.
pub const SSH_PORT: u16 = 2222;
pub const TEST_USER: &str = "testuser";
const TEST_PASSWORD: &str = "sshpool-test";
/// The tunnel mod installs at boot, which is slow.
const READY_ATTEMPTS: u32 = 240;
const READY_INTERVAL: Duration = Duration::from_millis(500);

static CONTAINER_ID: OnceLock<String> = OnceLock::new();
static SHARED: OnceCell<SshContainer> = OnceCell::const_new();

#[ctor::dtor]
fn remove_container_on_exit() {
    let Some(id) = CONTAINER_ID.get() else {
        return;
    };
    let Ok(rt) = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    else {
        return;
    };
    rt.block_on(async {
        let Ok(docker) = Docker::connect_with_local_defaults() else {
            return;
        };
        let force = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        let _ = docker.remove_container(id, Some(force)).await;
    });
}

/// The binary-wide container, started on first use.
pub async fn shared_container() -> &'static SshContainer {
    SHARED
        .get_or_init(|| async {
            SshContainer::start()
                .await
                .expect("failed to start SSH container")
        })
        .await
}

pub struct SshContainer {
    port: u16,
}

impl SshContainer {
    async fn start() -> Result<Self, BoxError> {
        let docker = Docker::connect_with_local_defaults()?;
        pull(&docker).await?;

        let port = free_port().await?;
        let name = format!("sshpool-ssh-test-{}", std::process::id());
        let created = docker
            .create_container(
                Some(CreateContainerOptions {
                    name: Some(name),
                    ..Default::default()
                }),
                container_body(port),
            )
            .await?;
        let _ = CONTAINER_ID.set(created.id.clone());

        docker
            .start_container(&created.id, None::<StartContainerOptions>)
            .await?;
        wait_for_banner(port).await?;
        Ok(Self { port })
    }

    pub fn host(&self) -> &'static str {
        "127.0.0.1"
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &'static str {
        TEST_USER
    }

    pub fn credential(&self) -> Credential {
        Credential::password(TEST_PASSWORD)
    }
}

async fn pull(docker: &Docker) -> Result<(), BoxError> {
    let options = CreateImageOptions {
        from_image: Some(IMAGE.to_string()),
        ..Default::default()
    };
    let mut progress = docker.create_image(Some(options), None, None);
    while let Some(step) = progress.next().await {
        step?;
    }
    Ok(())
}

fn container_body(host_port: u16) -> ContainerCreateBody {
    let env = [
        "PUID=1000".to_string(),
        "PGID=1000".to_string(),
        format!("USER_NAME={}", TEST_USER),
        "PASSWORD_ACCESS=true".to_string(),
        format!("USER_PASSWORD={}", TEST_PASSWORD),
        // Enables AllowTcpForwarding for direct-tcpip channels.
        "DOCKER_MODS=linuxserver/mods:openssh-server-ssh-tunnel".to_string(),
    ];
    let binding = PortBinding {
        host_ip: Some("127.0.0.1".to_string()),
        host_port: Some(host_port.to_string()),
    };
    let ports = HashMap::from([(format!("{}/tcp", SSH_PORT), Some(vec![binding]))]);

    ContainerCreateBody {
        image: Some(IMAGE.to_string()),
        env: Some(env.to_vec()),
        host_config: Some(HostConfig {
            port_bindings: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    }
}

async fn free_port() -> Result<u16, BoxError> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    Ok(listener.local_addr()?.port())
}

/// A bound port is not enough; sshd must be sending its identification line.
async fn wait_for_banner(port: u16) -> Result<(), BoxError> {
    let addr = format!("127.0.0.1:{}", port);
    for _ in 0..READY_ATTEMPTS {
        if sends_banner(&addr).await {
            tokio::time::sleep(READY_INTERVAL).await;
            return Ok(());
        }
        tokio::time::sleep(READY_INTERVAL).await;
    }
    Err("SSH container did not become ready in time".into())
}

async fn sends_banner(addr: &str) -> bool {
    let Ok(mut stream) = TcpStream::connect(addr).await else {
        return false;
    };
    let mut buf = [0u8; 32];
    match tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf)).await {
        Ok(Ok(n)) => buf[..n].starts_with(b"SSH-"),
        _ => false,
    }
}
