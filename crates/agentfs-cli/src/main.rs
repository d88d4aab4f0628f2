//! A thin command-line surface over the facade (spec §9 ambient stack): a
//! runnable, testable entry point standing in for the spec's explicitly
//! out-of-scope HTTP/RPC transport. State lives in memory for the
//! process's lifetime and round-trips through the facade's own
//! `export_zone`/`import_zone` as a JSON file, so invocations chain
//! without requiring a disk-backed metadata store the lower crates don't
//! provide.

mod args;
mod namespace;
mod state;

use std::sync::{Arc, LazyLock};

use agentfs_blob::stream_from_bytes;
use agentfs_facade::{AgentFsConfig, Facade};
use agentfs_rebac::{ConsistencyLevel, Entity, Subject};
use anyhow::{bail, Context, Result};
use clap::Parser;

use crate::args::{CliArguments, Commands};

/// The runtimes used by the application.
struct Runtimes {
    tokio_runtime: tokio::runtime::Runtime,
}

impl Default for Runtimes {
    fn default() -> Self {
        let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("tokio runtime");
        Self { tokio_runtime }
    }
}

static RUNTIMES: LazyLock<Runtimes> = LazyLock::new(Runtimes::default);

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    RUNTIMES.tokio_runtime.block_on(future)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = CliArguments::parse();
    let zone = agentfs_std::ZoneId::new(args.zone.clone());
    let subject = parse_entity(&zone, &args.subject).context("parsing --subject")?;

    let config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
            AgentFsConfig::from_toml(&text)?
        }
        None => AgentFsConfig::default(),
    };

    let metadata = Arc::new(agentfs_metadata::InMemoryMetadataStore::new());
    let blobs = Arc::new(agentfs_blob::InMemoryBlobStore::new());
    let tuples: Arc<dyn agentfs_rebac::TupleStore> = Arc::new(agentfs_rebac::InMemoryTupleStore::new(metadata.clone()));

    let facade = Facade::new(
        zone.clone(),
        metadata,
        blobs,
        tuples,
        namespace::default_namespace(),
        namespace::GROUP_RELATIONS.iter().map(|s| s.to_string()),
        namespace::HIERARCHY_RELATIONS.iter().map(|s| s.to_string()),
        config,
    );

    if let Some(state_path) = &args.state {
        if let Some(export) = state::load(state_path)? {
            facade.import_zone(&export)?;
        }
    }

    let outcome = run_command(&facade, &subject, args.command);

    if let Some(state_path) = &args.state {
        let export = facade.export_zone()?;
        state::save(state_path, &export)?;
    }

    outcome
}

fn parse_entity(zone: &agentfs_std::ZoneId, raw: &str) -> Result<Entity> {
    let (entity_type, entity_id) = raw
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("expected `type:id`, got `{raw}`"))?;
    Ok(Entity::new(zone.clone(), entity_type, entity_id))
}

fn run_command<M, B>(facade: &Facade<M, B>, subject: &Entity, command: Commands) -> Result<()>
where
    M: agentfs_metadata::MetadataStore + 'static,
    B: agentfs_blob::BlobStore + 'static,
{
    match command {
        Commands::Mount {
            mount_point,
            backend_id,
            object_type,
            read_only,
        } => {
            let mount = facade.mount(subject, &mount_point, &backend_id, object_type, agentfs_core::MountFlags { read_only })?;
            println!("mounted {} -> backend {} ({})", mount.mount_point, mount.backend_id, mount.object_type);
            Ok(())
        }
        Commands::Unmount { mount_point } => {
            facade.unmount(subject, &mount_point)?;
            println!("unmounted {mount_point}");
            Ok(())
        }
        Commands::ListMounts => {
            let view = facade.list_mounts(subject, ConsistencyLevel::Eventual)?;
            for mount in view.mounts {
                println!("{}\t{}\t{}", mount.mount_point, mount.backend_id, mount.object_type);
            }
            Ok(())
        }
        Commands::Gc => {
            let collected = block_on(facade.gc())?;
            println!("collected {collected} blob(s)");
            Ok(())
        }
        Commands::Read { path } => {
            let stream = block_on(facade.read(subject, &path, ConsistencyLevel::Eventual))?;
            let bytes = block_on(agentfs_blob::read_to_vec(stream))?;
            print!("{}", String::from_utf8_lossy(&bytes));
            Ok(())
        }
        Commands::Write { path, text, from_file } => {
            let bytes = match (text, from_file) {
                (Some(text), None) => text.into_bytes(),
                (None, Some(file)) => std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?,
                _ => bail!("pass exactly one of --text or --from-file"),
            };
            let inode = block_on(facade.write(subject, &path, stream_from_bytes(bytes)))?;
            println!("wrote {} ({} bytes)", inode.path, inode.size);
            Ok(())
        }
        Commands::List { path, limit } => {
            let page = facade.list(subject, &path, None, limit, ConsistencyLevel::Eventual)?;
            for entry in page.entries {
                let marker = if entry.kind == agentfs_core::Kind::Dir { "/" } else { "" };
                println!("{}{marker}", entry.path);
            }
            Ok(())
        }
        Commands::Stat { path } => {
            let inode = facade.stat(subject, &path, ConsistencyLevel::Eventual)?;
            println!("{path}: kind={:?} size={} owner={}", inode.kind, inode.size, inode.owner_subject);
            Ok(())
        }
        Commands::Delete { path } => {
            facade.delete(subject, &path)?;
            println!("deleted {path}");
            Ok(())
        }
        Commands::Rename { from, to } => {
            let inode = facade.rename(subject, &from, &to)?;
            println!("renamed to {}", inode.path);
            Ok(())
        }
        Commands::Mkdir { path } => {
            facade.mkdir(subject, &path)?;
            println!("created directory {path}");
            Ok(())
        }
        Commands::Versions { path } => {
            let page = facade.versions(subject, &path, None, 256)?;
            for version in page.entries {
                println!("{}\t{}\t{}", version.id, version.content_hash.to_hex(), version.author);
            }
            Ok(())
        }
        Commands::Restore { path, version } => {
            let inode = facade.restore(subject, &path, agentfs_std::VersionId(version))?;
            println!("restored {} to version {version} (now head {})", inode.path, inode.current_version.unwrap());
            Ok(())
        }
        Commands::Grep { path, pattern } => {
            for line in block_on(facade.grep(subject, &path, &pattern))? {
                println!("{line}");
            }
            Ok(())
        }
        Commands::RebacGrant {
            subject: grant_subject,
            relation,
            object_type,
            object_id,
        } => {
            let grant_subject = parse_entity(facade.zone(), &grant_subject)?;
            let object = Entity::new(facade.zone().clone(), object_type, object_id);
            let revision = facade.rebac_write(agentfs_rebac::Tuple {
                subject: Subject::Direct(grant_subject),
                relation,
                object,
                zone: facade.zone().clone(),
                caveat: None,
                expiry: None,
                revision: agentfs_std::Revision::ZERO,
            })?;
            println!("granted at revision {revision}");
            Ok(())
        }
        Commands::RebacRevoke {
            subject: revoke_subject,
            relation,
            object_type,
            object_id,
        } => {
            let revoke_subject = parse_entity(facade.zone(), &revoke_subject)?;
            let object = Entity::new(facade.zone().clone(), object_type, object_id);
            let revision = facade.rebac_delete(&Subject::Direct(revoke_subject), &relation, &object)?;
            println!("revoked at revision {revision}");
            Ok(())
        }
        Commands::RebacCheck {
            subject: check_subject,
            permission,
            object_type,
            object_id,
        } => {
            let check_subject = parse_entity(facade.zone(), &check_subject)?;
            let object = Entity::new(facade.zone().clone(), object_type, object_id);
            let allowed = facade.rebac_check(&check_subject, &permission, &object, ConsistencyLevel::Eventual)?;
            println!("{allowed}");
            Ok(())
        }
        Commands::RebacExpand {
            object_type,
            object_id,
            permission,
        } => {
            let object = Entity::new(facade.zone().clone(), object_type, object_id);
            for entity in facade.rebac_expand(&object, &permission)? {
                println!("{entity}");
            }
            Ok(())
        }
    }
}
