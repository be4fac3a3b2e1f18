//! Namespace command - create and inspect groups and user namespaces.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};

use super::open_state;
use crate::local::models::CreateNamespace;
use crate::types::{Namespace, NamespaceId, NamespaceKind, Plan};

#[derive(Args)]
pub struct NamespaceCmd {
    #[command(subcommand)]
    pub command: NamespaceSubCmd,
}

#[derive(Subcommand)]
pub enum NamespaceSubCmd {
    /// Create a group or user namespace
    Create(CreateCmd),

    /// Show a namespace and its root
    Show(ShowCmd),

    /// List all namespaces
    List,

    /// Change a namespace's plan
    SetPlan(SetPlanCmd),

    /// Exclude a namespace from the free user cap
    Exclude(ExcludeCmd),
}

#[derive(Args)]
pub struct CreateCmd {
    pub name: String,

    /// URL path segment (default: derived from name)
    #[arg(long)]
    pub path: Option<String>,

    /// Parent group id; omit for a root namespace
    #[arg(long)]
    pub parent: Option<NamespaceId>,

    #[arg(long, default_value = "free")]
    pub plan: Plan,

    /// Create a personal namespace instead of a group
    #[arg(long)]
    pub personal: bool,
}

#[derive(Args)]
pub struct ShowCmd {
    pub id: NamespaceId,
}

#[derive(Args)]
pub struct SetPlanCmd {
    pub id: NamespaceId,
    pub plan: Plan,
}

#[derive(Args)]
pub struct ExcludeCmd {
    pub id: NamespaceId,

    /// Remove the exclusion instead
    #[arg(long)]
    pub undo: bool,
}

impl NamespaceCmd {
    pub async fn run(&self) -> Result<()> {
        let state = open_state().await?;
        let db = state.db();

        match &self.command {
            NamespaceSubCmd::Create(cmd) => {
                if cmd.personal && cmd.parent.is_some() {
                    bail!("Personal namespaces cannot have a parent");
                }
                let namespace = db
                    .create_namespace(&CreateNamespace {
                        name: cmd.name.clone(),
                        path: cmd.path.clone().unwrap_or_else(|| slugify(&cmd.name)),
                        kind: if cmd.personal {
                            NamespaceKind::User
                        } else {
                            NamespaceKind::Group
                        },
                        parent_id: cmd.parent,
                        plan: cmd.plan,
                    })
                    .await?;
                println!("Created namespace {}", describe(&namespace));
            }
            NamespaceSubCmd::Show(cmd) => {
                let namespace = db.get_namespace(cmd.id).await?;
                println!("{}", describe(&namespace));
                println!("  kind:     {}", namespace.kind);
                println!("  plan:     {} ({})", namespace.plan, plan_class(namespace.plan));
                println!("  excluded: {}", namespace.cap_excluded);
                if !namespace.is_root() {
                    let root = db.root_of(namespace.id).await?;
                    println!("  root:     {}", describe(&root));
                }
            }
            NamespaceSubCmd::List => {
                let namespaces = db.list_namespaces().await?;
                if namespaces.is_empty() {
                    println!("No namespaces yet. Run `seatcap namespace create <name>`.");
                    return Ok(());
                }
                for namespace in &namespaces {
                    let parent = namespace
                        .parent_id
                        .map_or(String::new(), |p| format!(" parent={p}"));
                    println!("{} [{}]{}", describe(namespace), namespace.plan, parent);
                }
            }
            NamespaceSubCmd::SetPlan(cmd) => {
                db.set_plan(cmd.id, cmd.plan).await?;
                println!("Namespace {} is now on plan {}", cmd.id, cmd.plan);
            }
            NamespaceSubCmd::Exclude(cmd) => {
                db.set_cap_excluded(cmd.id, !cmd.undo).await?;
                if cmd.undo {
                    println!("Namespace {} is subject to the free user cap again", cmd.id);
                } else {
                    println!("Namespace {} is excluded from the free user cap", cmd.id);
                }
            }
        }

        Ok(())
    }
}

fn describe(namespace: &Namespace) -> String {
    format!("#{} {} ({})", namespace.id, namespace.name, namespace.path)
}

fn plan_class(plan: Plan) -> &'static str {
    if plan.is_trial() {
        "trial"
    } else if plan.is_paid() {
        "paid"
    } else {
        "free"
    }
}

fn slugify(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();

    slug.split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
