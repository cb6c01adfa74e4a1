use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use prometheus::{BasicAuthentication, labels};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::spawn_blocking;
use tokio::time::{Duration, sleep};

use crate::cli::{SubCommandExtend, open_engine};
use crate::config::{ExtractOptions, MatchOptions, Opts};
use crate::metadata::MetadataStore;
use crate::server;
use crate::service::MatchService;
use crate::thumbnail::ThumbnailStore;

#[derive(Parser, Debug, Clone)]
pub struct ServeCommand {
    #[command(flatten)]
    pub extract: ExtractOptions,
    #[command(flatten)]
    pub matching: MatchOptions,
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub addr: String,
    /// 正在进行的匹配数量达到该值时健康检查返回 404
    #[arg(long, value_name = "COUNT", default_value_t = 2)]
    pub unhealthy: usize,
    /// 设计页面地址前缀，后接设计 ID
    #[arg(long, value_name = "URL", default_value = "http://www.threadless.com/product/")]
    pub design_url: String,
    /// 缩略图文件后缀名
    #[arg(long, default_value = "jpg")]
    pub thumbnail_ext: String,
    /// prometheus 主动推送地址
    #[arg(long, value_name = "URL")]
    pub prometheus_push: Option<String>,
    /// 自定义 instance 标签值
    #[arg(long, value_name = "NAME")]
    pub prometheus_instance: Option<String>,
    /// prometheus 认证信息，格式为 username:password
    #[arg(long, value_name = "AUTH")]
    pub prometheus_auth: Option<String>,
}

impl SubCommandExtend for ServeCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let metadata = MetadataStore::open(opts.data_dir.metadata())?;
        let thumbnails = ThumbnailStore::new(opts.data_dir.thumbnails(), &self.thumbnail_ext);

        // 描述符库加载完成后才开始监听
        let engine = open_engine(&opts.data_dir, &self.extract, &self.matching).await?;
        let service = MatchService::new(
            engine,
            metadata,
            thumbnails,
            self.design_url.clone(),
            self.unhealthy,
        );

        let state = server::AppState::new(service);
        let app = server::create_app(state);

        if let Some(url) = self.prometheus_push.clone() {
            let instance = self.prometheus_instance.clone().unwrap_or_else(|| self.addr.clone());
            let auth = match &self.prometheus_auth {
                Some(s) => {
                    let (username, password) =
                        s.split_once(':').context("prometheus 认证信息格式应为 username:password")?;
                    Some((username.to_string(), password.to_string()))
                }
                None => None,
            };
            tokio::spawn(push_metrics(url, instance, auth));
        }

        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
        info!("服务器已关闭");

        Ok(())
    }
}

/// 每 30 秒推送一次指标
async fn push_metrics(url: String, instance: String, auth: Option<(String, String)>) {
    loop {
        let metric_families = prometheus::gather();
        let url = url.clone();
        let instance = instance.clone();
        let auth = auth.clone();
        let r = spawn_blocking(move || {
            prometheus::push_metrics(
                "design-match",
                labels! {
                    "instance".to_string() => instance,
                },
                &url,
                metric_families,
                auth.map(|(username, password)| BasicAuthentication { username, password }),
            )
        })
        .await;
        match r {
            Ok(Err(e)) => error!("推送指标失败: {e}"),
            Err(e) => error!("推送指标失败: {e}"),
            Ok(Ok(())) => {}
        }
        sleep(Duration::from_secs(30)).await;
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("无法监听 Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("无法监听 SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("收到 Ctrl+C，正在关闭服务器"),
        _ = terminate => info!("收到 SIGTERM，正在关闭服务器"),
    }
}
