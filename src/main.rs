//! URL Vitals 主程序入口

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    url_vitals::core::app::main().await
}
