use crate::cmd::Context;
use crate::output::{print_json, print_table};
use anyhow::Context as _;
use clap::Subcommand;
use cloudtoggle_core::group::{FileGroupRepository, GroupRepository, NewGroup};
use cloudtoggle_core::types::{ResourceBinding, Tag, TagSelector};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum GroupSubcommand {
    /// List every group
    List,

    /// Show one group with its bindings
    Show {
        /// Group id
        id: String,
    },

    /// Add a group
    Add {
        /// Display name
        name: String,
        /// Free-form operator label
        #[arg(long, default_value = "active")]
        status: String,
        /// Binding as TYPE:key=value[,key=value...], e.g. EC2:env=dev (repeatable)
        #[arg(long = "resource", value_name = "BINDING")]
        resources: Vec<String>,
    },

    /// Delete a group
    Delete {
        /// Group id
        id: String,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(ctx: &Context, subcmd: GroupSubcommand) -> anyhow::Result<()> {
    let config = ctx.load_config()?;
    let repo = FileGroupRepository::new(&config.data_dir);
    match subcmd {
        GroupSubcommand::List => list(&repo, ctx.json),
        GroupSubcommand::Show { id } => show(&repo, &id, ctx.json),
        GroupSubcommand::Add {
            name,
            status,
            resources,
        } => add(&repo, name, status, &resources, ctx.json),
        GroupSubcommand::Delete { id } => delete(&repo, &id, ctx.json),
    }
}

fn list(repo: &FileGroupRepository, json: bool) -> anyhow::Result<()> {
    let groups = repo.list_groups()?;
    if json {
        return print_json(&groups);
    }
    if groups.is_empty() {
        println!("No groups.");
        return Ok(());
    }
    let rows = groups
        .iter()
        .map(|g| {
            vec![
                g.id.clone(),
                g.name.clone(),
                g.status.clone(),
                g.resources.len().to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "STATUS", "BINDINGS"], rows);
    Ok(())
}

fn show(repo: &FileGroupRepository, id: &str, json: bool) -> anyhow::Result<()> {
    let group = repo.get_group(id)?;
    if json {
        return print_json(&group);
    }
    println!("Group:  {} ({})", group.name, group.id);
    if !group.status.is_empty() {
        println!("Status: {}", group.status);
    }
    if group.resources.is_empty() {
        println!("\nNo bindings.");
        return Ok(());
    }
    println!();
    let rows = group
        .resources
        .iter()
        .map(|b| vec![b.kind.to_string(), b.tags.to_string()])
        .collect();
    print_table(&["TYPE", "TAGS"], rows);
    Ok(())
}

fn add(
    repo: &FileGroupRepository,
    name: String,
    status: String,
    resources: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let resources = resources
        .iter()
        .map(|raw| parse_binding(raw))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let group = repo.add_group(NewGroup {
        name,
        status,
        resources,
    })?;
    if json {
        print_json(&group)?;
    } else {
        println!("Added group '{}' with id {}", group.name, group.id);
    }
    Ok(())
}

fn delete(repo: &FileGroupRepository, id: &str, json: bool) -> anyhow::Result<()> {
    repo.delete_group(id)?;
    if json {
        print_json(&serde_json::json!({ "deleted": id }))?;
    } else {
        println!("Deleted group {id}");
    }
    Ok(())
}

/// Parse `TYPE:key=value[,key=value...]`.
fn parse_binding(raw: &str) -> anyhow::Result<ResourceBinding> {
    let (kind, pairs) = raw
        .split_once(':')
        .with_context(|| format!("invalid binding '{raw}': expected TYPE:key=value"))?;
    let kind = kind.trim();
    if kind.is_empty() {
        anyhow::bail!("invalid binding '{raw}': missing resource type");
    }
    let mut tags = Vec::new();
    for pair in pairs.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("invalid tag '{pair}' in binding '{raw}': expected key=value"))?;
        tags.push(Tag::new(key.trim(), value.trim()));
    }
    Ok(ResourceBinding::new(kind, TagSelector::new(tags)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_type_and_tags() {
        let b = parse_binding("EC2:env=dev, team=web").unwrap();
        assert_eq!(b.kind.as_str(), "EC2");
        assert_eq!(
            b.tags.tags(),
            &[Tag::new("env", "dev"), Tag::new("team", "web")]
        );
    }

    #[test]
    fn binding_without_tags_has_empty_selector() {
        let b = parse_binding("RDS:").unwrap();
        assert!(b.tags.is_empty());
    }

    #[test]
    fn rejects_malformed_bindings() {
        assert!(parse_binding("EC2").is_err());
        assert!(parse_binding(":env=dev").is_err());
        assert!(parse_binding("EC2:env").is_err());
    }
}
