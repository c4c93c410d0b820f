//! cellarium-cmd: Manage a wine cellar from the terminal
//!
//! Usage:
//!   cellarium-cmd list
//!   cellarium-cmd add "Château Demo" --wine-type red --year 2018 --quantity 2
//!   cellarium-cmd scan label.jpg
//!   cellarium-cmd quantity <id> -1
//!   cellarium-cmd archive <id> --rating 4 --rebuy yes
//!   cellarium-cmd restore <id>

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use cellarium::cli::{CellarCommand, CmdArgs};
use cellarium::imagery::{first_loadable, HttpImageSearch, ImageSearch};
use cellarium::vision::{recognize_or_demo, recognizer_from_config};
use cellarium::{
    BottleDraft, CacheStore, CellarConfig, CellarManager, EchoGate, HttpRemoteStore, Rebuy,
    RecordId, RemoteStore,
};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CmdArgs::parse();

    let mut config = match &args.config {
        Some(path) => CellarConfig::load(path).map_err(|e| format!("Invalid config: {}", e))?,
        None => CellarConfig::default(),
    };
    if let Some(server) = &args.server {
        config.server_url = Some(server.clone());
    }

    let gate = EchoGate::new(
        Duration::from_millis(config.suppression_grace_ms),
        Duration::from_millis(config.suppression_max_hold_ms),
    );
    let manager = Arc::new(CellarManager::new(
        CacheStore::new(&config.cache_path),
        config.merge_policy,
        gate,
    ));
    manager.load_from_cache().await;

    // One-shot binding: reconcile with the server up front so the command
    // operates on the merged collection. No subscription is needed for a
    // process that exits right after its single mutation.
    if let (Some(url), Some(user)) = (&config.server_url, &args.user) {
        let remote: Arc<dyn RemoteStore> = Arc::new(HttpRemoteStore::new(url.clone()));
        if let Err(e) = manager.bind_remote(remote, user).await {
            eprintln!("warning: remote unavailable, working locally ({})", e);
        }
    }

    match args.command {
        CellarCommand::List => {
            let collection = manager.snapshot().await;
            println!("Cellar ({} bottles):", collection.total_bottles());
            for record in &collection.active {
                println!(
                    "  {}  {} x{}  [{}]",
                    record.id, record.name, record.quantity, record.wine_type
                );
            }
            println!("Archive ({} entries):", collection.archive.len());
            for entry in &collection.archive {
                println!(
                    "  {}  {}  rated {}/5",
                    entry.id(),
                    entry.record.name,
                    entry.rating
                );
            }
        }

        CellarCommand::Add {
            name,
            wine_type,
            producer,
            year,
            region,
            grape,
            boldness,
            tannins,
            acidity,
            price,
            quantity,
            store,
            notes,
        } => {
            let draft = BottleDraft {
                name,
                producer: producer.unwrap_or_default(),
                wine_type: Some(wine_type.parse()?),
                year,
                region: region.unwrap_or_default(),
                grape: grape.unwrap_or_default(),
                boldness,
                tannins,
                acidity,
                price,
                quantity,
                store: store.unwrap_or_default(),
                notes: notes.unwrap_or_default(),
                image: None,
            };
            let record = manager.add(draft).await;
            println!("Added {} ({})", record.name, record.id);
        }

        CellarCommand::Scan {
            image,
            no_photo_search,
        } => {
            let bytes = tokio::fs::read(&image).await?;
            let image_b64 = BASE64.encode(&bytes);

            let recognizer = recognizer_from_config(&config.recognizer);
            let label = recognize_or_demo(recognizer.as_ref(), &image_b64).await;
            println!(
                "Recognized: {} ({}, {})",
                label.name,
                label.producer,
                label.year.map_or("n/a".to_string(), |y| y.to_string())
            );

            let mut draft = label.clone().into_draft(Some(image_b64));

            if !no_photo_search {
                if let Some(endpoint) = &config.image_search.endpoint {
                    let search =
                        HttpImageSearch::new(endpoint.clone(), config.image_search.api_key.clone());
                    let query = format!("{} {}", label.producer, label.name);
                    match search.search(query.trim()).await {
                        Ok(candidates) => {
                            let photo = first_loadable(
                                &reqwest::Client::new(),
                                &candidates,
                                Duration::from_millis(config.image_search.attempt_timeout_ms),
                            )
                            .await;
                            if let Some(photo) = photo {
                                draft.image = Some(photo);
                            } else {
                                println!("No product photo found, keeping the label shot");
                            }
                        }
                        Err(e) => eprintln!("warning: image search failed ({})", e),
                    }
                }
            }

            let record = manager.add(draft).await;
            println!("Added {} ({})", record.name, record.id);
        }

        CellarCommand::Quantity { id, delta } => {
            match manager.adjust_quantity(&RecordId(id), delta).await {
                Some(quantity) => println!("Quantity now {}", quantity),
                None => {
                    eprintln!("No such record");
                    std::process::exit(1);
                }
            }
        }

        CellarCommand::Archive {
            id,
            rating,
            rebuy,
            notes,
        } => {
            let rebuy = rebuy
                .map(|s| s.parse::<Rebuy>())
                .transpose()
                .map_err(|e| format!("{}", e))?;
            match manager
                .archive(&RecordId(id), rating, rebuy, notes.unwrap_or_default())
                .await
            {
                Some(entry) => println!("Archived {} rated {}/5", entry.record.name, entry.rating),
                None => {
                    eprintln!("No such record");
                    std::process::exit(1);
                }
            }
        }

        CellarCommand::Restore { id } => match manager.restore(&RecordId(id)).await {
            Some(record) => println!("Restored {} as {}", record.name, record.id),
            None => {
                eprintln!("No such archive entry");
                std::process::exit(1);
            }
        },

        CellarCommand::Delete { id, archived } => {
            let id = RecordId(id);
            let removed = if archived {
                manager.delete_archived(&id).await
            } else {
                manager.delete(&id).await
            };
            if removed {
                println!("Deleted {}", id);
            } else {
                eprintln!("No such record");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
