//! Dependency-aware review batching.
//!
//! Plan file groups are flattened in priority order, then related files are
//! clustered so one LLM call sees the files that reference each other.
//! Relationship sources, in precedence order: request enrichment (when
//! non-empty), retriever chunk metadata, and finally a shared-directory
//! fallback. Batches never exceed the cap; oversized clusters are split in
//! traversal order so importer/importee pairs stay adjacent.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, info};

use rag_engine::ScoredChunk;

use crate::model::{EnrichmentData, Priority, ReviewFile, ReviewPlan};

/// Hard cap on files per Stage 1 batch.
pub const MAX_FILES_PER_BATCH: usize = 7;

/// One file scheduled into a batch, with its group priority attached.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub file: ReviewFile,
    pub priority: Priority,
    pub has_relationships: bool,
}

/// Relationship map derived from precomputed enrichment.
pub fn relations_from_enrichment(enrichment: &EnrichmentData) -> HashMap<String, HashSet<String>> {
    let mut map: HashMap<String, HashSet<String>> = HashMap::new();
    for rel in &enrichment.relationships {
        map.entry(rel.source_file.clone())
            .or_default()
            .insert(rel.target_file.clone());
        map.entry(rel.target_file.clone())
            .or_default()
            .insert(rel.source_file.clone());
    }
    map
}

/// Relationship map discovered from retrieval metadata: a changed file A
/// relates to changed file B when A's chunks import or extend something
/// named like B.
pub fn relations_from_chunks(
    chunks: &[ScoredChunk],
    changed_files: &[String],
) -> HashMap<String, HashSet<String>> {
    let stems: Vec<(String, String)> = changed_files
        .iter()
        .map(|p| (p.clone(), stem_of(p)))
        .collect();

    let mut map: HashMap<String, HashSet<String>> = HashMap::new();
    for chunk in chunks {
        let payload = &chunk.payload;
        // Only relationships between changed files matter for batching.
        let Some(source) = changed_files
            .iter()
            .find(|f| payload.path == **f || payload.path.ends_with(&format!("/{f}")))
        else {
            continue;
        };

        let mut referenced: HashSet<&str> = HashSet::new();
        for imp in &payload.imports {
            for (path, stem) in &stems {
                if path != source && imp.contains(stem.as_str()) {
                    referenced.insert(path);
                }
            }
        }
        for name in payload.extends.iter().chain(payload.implements.iter()) {
            for (path, stem) in &stems {
                if path != source && name == stem {
                    referenced.insert(path);
                }
            }
        }

        for target in referenced {
            map.entry(source.clone())
                .or_default()
                .insert(target.to_string());
            map.entry(target.to_string())
                .or_default()
                .insert(source.clone());
        }
    }
    map
}

/// Groups planned files into batches.
///
/// When `relations` is empty, files sharing a directory are treated as
/// related (the fallback policy).
pub fn create_batches(
    plan: &ReviewPlan,
    relations: &HashMap<String, HashSet<String>>,
    max_per_batch: usize,
) -> Vec<Vec<BatchItem>> {
    // Flatten groups in priority order, keeping in-group order.
    let mut groups: Vec<_> = plan.file_groups.iter().collect();
    groups.sort_by_key(|g| g.priority);

    let mut flat: Vec<BatchItem> = Vec::new();
    for group in groups {
        for file in &group.files {
            flat.push(BatchItem {
                file: file.clone(),
                priority: group.priority,
                has_relationships: false,
            });
        }
    }
    if flat.is_empty() {
        return Vec::new();
    }

    let planned: Vec<String> = flat.iter().map(|i| i.file.path.clone()).collect();
    let adjacency = if relations.is_empty() {
        directory_adjacency(&planned)
    } else {
        restrict_to(relations, &planned)
    };

    for item in &mut flat {
        item.has_relationships = adjacency
            .get(&item.file.path)
            .is_some_and(|n| !n.is_empty());
    }

    // Connected components in flatten (priority) order, BFS traversal so
    // directly related files end up adjacent within a component.
    let index_of: HashMap<&str, usize> = flat
        .iter()
        .enumerate()
        .map(|(i, item)| (item.file.path.as_str(), i))
        .collect();

    let mut visited: HashSet<String> = HashSet::new();
    let mut components: Vec<Vec<usize>> = Vec::new();

    for start in 0..flat.len() {
        let start_path = flat[start].file.path.clone();
        if visited.contains(&start_path) {
            continue;
        }

        let mut component = Vec::new();
        let mut queue = VecDeque::from([start_path.clone()]);
        visited.insert(start_path);

        while let Some(path) = queue.pop_front() {
            if let Some(&idx) = index_of.get(path.as_str()) {
                component.push(idx);
            }
            if let Some(neighbors) = adjacency.get(&path) {
                let mut sorted: Vec<&String> = neighbors.iter().collect();
                sorted.sort_by_key(|n| index_of.get(n.as_str()).copied().unwrap_or(usize::MAX));
                for n in sorted {
                    if index_of.contains_key(n.as_str()) && visited.insert(n.clone()) {
                        queue.push_back(n.clone());
                    }
                }
            }
        }
        components.push(component);
    }

    // Pack components into batches: a component larger than the cap is
    // split along its BFS order; smaller components fill up shared batches.
    let mut batches: Vec<Vec<BatchItem>> = Vec::new();
    let mut current: Vec<BatchItem> = Vec::new();

    for component in components {
        if component.len() > max_per_batch {
            if !current.is_empty() {
                batches.push(std::mem::take(&mut current));
            }
            for slice in component.chunks(max_per_batch) {
                batches.push(slice.iter().map(|&i| flat[i].clone()).collect());
            }
            continue;
        }

        if current.len() + component.len() > max_per_batch {
            batches.push(std::mem::take(&mut current));
        }
        current.extend(component.iter().map(|&i| flat[i].clone()));
    }
    if !current.is_empty() {
        batches.push(current);
    }

    let related = batches
        .iter()
        .flatten()
        .filter(|i| i.has_relationships)
        .count();
    info!(
        files = flat.len(),
        batches = batches.len(),
        related,
        "dependency batching complete"
    );
    debug!(
        sizes = ?batches.iter().map(|b| b.len()).collect::<Vec<_>>(),
        "batch sizes"
    );

    batches
}

fn restrict_to(
    relations: &HashMap<String, HashSet<String>>,
    planned: &[String],
) -> HashMap<String, HashSet<String>> {
    let planned_set: HashSet<&str> = planned.iter().map(|s| s.as_str()).collect();
    let mut out: HashMap<String, HashSet<String>> = HashMap::new();
    for (k, targets) in relations {
        if !planned_set.contains(k.as_str()) {
            continue;
        }
        let kept: HashSet<String> = targets
            .iter()
            .filter(|t| planned_set.contains(t.as_str()))
            .cloned()
            .collect();
        if !kept.is_empty() {
            out.insert(k.clone(), kept);
        }
    }
    out
}

/// Fallback adjacency: files in the same directory are related.
fn directory_adjacency(paths: &[String]) -> HashMap<String, HashSet<String>> {
    let mut by_dir: HashMap<&str, Vec<&String>> = HashMap::new();
    for p in paths {
        let dir = p.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
        by_dir.entry(dir).or_default().push(p);
    }

    let mut out: HashMap<String, HashSet<String>> = HashMap::new();
    for files in by_dir.values() {
        if files.len() < 2 {
            continue;
        }
        for a in files {
            for b in files {
                if a != b {
                    out.entry((*a).clone()).or_default().insert((*b).clone());
                }
            }
        }
    }
    out
}

fn stem_of(path: &str) -> String {
    let base = path.rsplit('/').next().unwrap_or(path);
    base.rsplit_once('.')
        .map(|(s, _)| s.to_string())
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileGroup;

    fn plan_with(paths: &[(&str, Priority)]) -> ReviewPlan {
        let mut groups: Vec<FileGroup> = Vec::new();
        for (path, priority) in paths {
            groups.push(FileGroup {
                group_id: format!("G_{}", path.replace('/', "_")),
                priority: *priority,
                rationale: String::new(),
                files: vec![ReviewFile {
                    path: path.to_string(),
                    focus_areas: vec![],
                    risk_level: None,
                    estimated_issues: None,
                }],
            });
        }
        ReviewPlan {
            analysis_summary: String::new(),
            file_groups: groups,
            files_to_skip: vec![],
            cross_file_concerns: vec![],
        }
    }

    #[test]
    fn directory_fallback_groups_services_together() {
        let plan = plan_with(&[
            ("src/services/user/a.py", Priority::Medium),
            ("src/services/user/b.py", Priority::Medium),
            ("src/services/order/c.py", Priority::Medium),
            ("src/services/order/d.py", Priority::Medium),
            ("src/services/order/e.py", Priority::Medium),
        ]);
        let batches = create_batches(&plan, &HashMap::new(), MAX_FILES_PER_BATCH);

        assert!(batches.iter().all(|b| b.len() <= MAX_FILES_PER_BATCH));
        // Files of one directory always share a batch.
        for dir in ["src/services/user", "src/services/order"] {
            let containing: Vec<usize> = batches
                .iter()
                .enumerate()
                .filter(|(_, b)| b.iter().any(|i| i.file.path.starts_with(dir)))
                .map(|(n, _)| n)
                .collect();
            assert_eq!(containing.len(), 1, "{dir} split across batches");
        }
    }

    #[test]
    fn related_files_share_a_batch_across_directories() {
        let plan = plan_with(&[
            ("src/api/handler.py", Priority::High),
            ("src/db/queries.py", Priority::Low),
        ]);
        let mut relations: HashMap<String, HashSet<String>> = HashMap::new();
        relations.insert(
            "src/api/handler.py".into(),
            HashSet::from(["src/db/queries.py".to_string()]),
        );
        relations.insert(
            "src/db/queries.py".into(),
            HashSet::from(["src/api/handler.py".to_string()]),
        );

        let batches = create_batches(&plan, &relations, MAX_FILES_PER_BATCH);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert!(batches[0].iter().all(|i| i.has_relationships));
    }

    #[test]
    fn oversized_cluster_is_split_at_cap() {
        let files: Vec<(String, Priority)> = (0..10)
            .map(|i| (format!("pkg/mod/f{i}.py"), Priority::Medium))
            .collect();
        let refs: Vec<(&str, Priority)> = files
            .iter()
            .map(|(p, pr)| (p.as_str(), *pr))
            .collect();
        let plan = plan_with(&refs);
        let batches = create_batches(&plan, &HashMap::new(), MAX_FILES_PER_BATCH);

        assert!(batches.len() >= 2);
        assert!(batches.iter().all(|b| b.len() <= MAX_FILES_PER_BATCH));
        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn priority_order_is_respected_across_batches() {
        let plan = plan_with(&[
            ("low/one.py", Priority::Low),
            ("crit/alpha.py", Priority::Critical),
        ]);
        let batches = create_batches(&plan, &HashMap::new(), MAX_FILES_PER_BATCH);
        let first = &batches[0][0];
        assert_eq!(first.priority, Priority::Critical);
    }

    #[test]
    fn chunk_relations_link_importers() {
        use rag_engine::ChunkPayload;
        let chunk = ScoredChunk {
            score: 0.9,
            payload: ChunkPayload {
                path: "src/api/handler.py".into(),
                language: "python".into(),
                workspace: "w".into(),
                project: "p".into(),
                branch: "main".into(),
                commit: "c".into(),
                indexed_at: String::new(),
                content: String::new(),
                content_type: "functions_classes".into(),
                semantic_names: vec![],
                primary_name: None,
                parent_context: vec![],
                parent_class: None,
                start_line: 1,
                end_line: 2,
                docstring: None,
                signature: None,
                extends: vec![],
                implements: vec![],
                imports: vec!["from db.queries import run_query".into()],
                namespace: None,
                parent_chunk_id: None,
                pr_number: None,
            },
        };
        let changed = vec!["src/api/handler.py".to_string(), "src/db/queries.py".to_string()];
        let relations = relations_from_chunks(&[chunk], &changed);
        assert!(
            relations["src/api/handler.py"].contains("src/db/queries.py"),
            "import reference should relate the two files"
        );
    }
}
