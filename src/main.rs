use cfgmgr::config::AppConfig;
use cfgmgr::{ConfigBackend, FilestoreBackend, Node, Ref};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    // Optional config file as the only argument
    let config_file = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load_from(config_file.as_deref())?;
    let path = config.document_path();

    let mut store = if config.store.initialize {
        FilestoreBackend::open_or_initialize(&path).await?
    } else {
        FilestoreBackend::open(&path).await?
    };

    println!("cfgmgr store at {}", path.display());
    let tree = store.get_tree(config.fill_depth()?).await?;
    print_tree(&mut store, &tree, 0).await?;

    Ok(())
}

async fn print_tree(store: &mut FilestoreBackend, node: &Node, indent: usize) -> anyhow::Result<()> {
    let kind = store.cache().await?.node_kind(&node.meta.meta_id)?;
    println!(
        "{:indent$}{} [{:?}, {} data]",
        "",
        node.meta.name,
        kind,
        node.data.len(),
        indent = indent * 2
    );

    for child in &node.children {
        match child {
            Ref::Inline(child) => Box::pin(print_tree(store, child, indent + 1)).await?,
            Ref::Id(id) => println!("{:indent$}{} ...", "", id, indent = (indent + 1) * 2),
        }
    }
    Ok(())
}
