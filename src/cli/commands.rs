use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::app::{AppContext, Result, ShelfError};
use crate::domain::{ItemRef, QueueItem};
use crate::queue::DownloadQueue;
use crate::store::{get_json, keys};

pub async fn add(ctx: &AppContext, collection_id: &str, items: Option<&str>) -> Result<()> {
    ctx.queue.initialize()?;

    let collection = ctx.fetcher.fetch_collection(collection_id).await?;
    let available = collection.items.clone().unwrap_or_default();

    let selected: Vec<ItemRef> = match items {
        Some(spec) => {
            let wanted = parse_ranges(spec)?;
            let selected: Vec<ItemRef> = available
                .into_iter()
                .filter(|item| wanted.contains(&item.number))
                .collect();
            if selected.len() < wanted.len() {
                eprintln!(
                    "{} requested chapters are not listed by the source",
                    wanted.len().saturating_sub(selected.len())
                );
            }
            selected
        }
        None => available,
    };

    if selected.is_empty() {
        println!("Nothing to download for {}", collection.title);
        return Ok(());
    }

    let added = ctx.queue.add(&collection, &selected);
    println!(
        "Queued {} of {} chapters from {}",
        added,
        selected.len(),
        collection.title
    );

    drain(&ctx.queue, collection_id).await;

    let mut missing = 0;
    for item in &selected {
        if !ctx.content.is_item_downloaded(collection_id, item.number)? {
            missing += 1;
        }
    }
    if missing > 0 {
        eprintln!("{} chapters failed to download", missing);
    } else {
        println!("Done: {}", collection.title);
    }

    Ok(())
}

pub async fn resume(ctx: &AppContext) -> Result<()> {
    ctx.queue.initialize()?;

    let pending = ctx.queue.snapshot().len();
    if pending == 0 {
        println!("Queue is empty");
        return Ok(());
    }

    println!("Resuming {} queued chapters...", pending);
    ctx.queue.wait_until_idle().await;
    println!("Queue drained");
    Ok(())
}

/// Waits for the queue to empty, printing progress for one collection.
async fn drain(queue: &DownloadQueue, collection_id: &str) {
    let total = queue.count_for_collection(collection_id);
    let remaining = AtomicUsize::new(total);
    let id = collection_id.to_string();

    let subscription = queue.subscribe(move |items: &[QueueItem]| {
        let left = items.iter().filter(|item| item.collection_id == id).count();
        if remaining.swap(left, Ordering::SeqCst) > left {
            println!("  {}/{}", total.saturating_sub(left), total);
        }
    });

    queue.wait_until_idle().await;
    subscription.unsubscribe();
}

pub fn show_queue(ctx: &AppContext) -> Result<()> {
    let items: Vec<QueueItem> =
        get_json(ctx.kv.as_ref(), keys::QUEUE_SNAPSHOT)?.unwrap_or_default();

    if items.is_empty() {
        println!("Queue is empty");
        return Ok(());
    }

    for item in items {
        println!(
            "{:<12} {} #{} {}",
            item.status, item.collection_title, item.item_number, item.item_title
        );
    }

    Ok(())
}

pub fn list(ctx: &AppContext) -> Result<()> {
    let collections = ctx.content.list_collections()?;

    if collections.is_empty() {
        println!("No downloaded novels");
        return Ok(());
    }

    for summary in collections {
        println!(
            "{} ({}/{} chapters)\n  {}",
            summary.meta.title, summary.downloaded_count, summary.meta.chapters_count, summary.meta.id
        );
    }

    Ok(())
}

pub fn show(ctx: &AppContext, collection_id: &str) -> Result<()> {
    let details = ctx
        .content
        .get_collection_details(collection_id)?
        .ok_or_else(|| ShelfError::CollectionNotFound(collection_id.to_string()))?;
    ctx.queue.load()?;

    let meta = &details.meta;
    println!("{}", meta.title);
    if let Some(author) = &meta.author {
        println!("by {}", author);
    }
    if !meta.tags.is_empty() {
        println!("[{}]", meta.tags.join(", "));
    }
    if let Some(description) = &meta.description {
        println!("\n{}\n", description);
    }
    println!(
        "{}/{} chapters downloaded",
        details.items.len(),
        meta.chapters_count
    );

    for entry in &details.items {
        println!("  {:>5}  {}", entry.number, entry.title);
    }

    let queued = ctx.queue.count_for_collection(collection_id);
    if queued > 0 {
        println!("{} chapters queued", queued);
    }

    Ok(())
}

pub fn read(ctx: &AppContext, collection_id: &str, number: u32) -> Result<()> {
    match ctx.content.get_item_content(collection_id, number)? {
        Some(item) => {
            println!("{}\n", item.display_title());
            println!("{}", item.content);
        }
        None => println!("Chapter {} of {} is not downloaded", number, collection_id),
    }
    Ok(())
}

pub fn remove(ctx: &AppContext, collection_id: &str, numbers: &[u32]) -> Result<()> {
    // Collections with queued downloads keep their metadata.
    ctx.queue.load()?;

    if numbers.is_empty() {
        ctx.content
            .remove_collections_batch(&[collection_id.to_string()])?;
        println!("Removed {}", collection_id);
        return Ok(());
    }

    for &number in numbers {
        ctx.content.remove_item(collection_id, number)?;
    }
    println!("Removed {} chapters from {}", numbers.len(), collection_id);
    Ok(())
}

pub async fn info(ctx: &AppContext, collection_id: &str) -> Result<()> {
    let meta = ctx.refresh_collection(collection_id).await?;

    println!("{}", meta.title);
    if let Some(author) = meta.author {
        println!("by {}", author);
    }
    if let Some(status) = meta.status {
        println!("Status: {}", status);
    }
    println!("{} chapters", meta.chapters_count);
    Ok(())
}

/// Parses a chapter selection such as `1-10,15` into a sorted set.
pub fn parse_ranges(spec: &str) -> Result<BTreeSet<u32>> {
    let invalid = |part: &str| ShelfError::Other(format!("Invalid chapter range: {:?}", part));
    let mut numbers = BTreeSet::new();

    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start: u32 = start.trim().parse().map_err(|_| invalid(part))?;
                let end: u32 = end.trim().parse().map_err(|_| invalid(part))?;
                if start > end {
                    return Err(invalid(part));
                }
                numbers.extend(start..=end);
            }
            None => {
                numbers.insert(part.parse().map_err(|_| invalid(part))?);
            }
        }
    }

    if numbers.is_empty() {
        return Err(invalid(spec));
    }
    Ok(numbers)
}
