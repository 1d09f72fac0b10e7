//! What well-known MCP servers can do, rendered for LLM prompts and the
//! status screen.
//!
//! Only servers present in `mcp.servers` are described; unknown names are
//! listed without a profile.

use std::collections::BTreeMap;

/// Static description of one kind of MCP server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServerProfile {
    pub name: &'static str,
    pub description: &'static str,
    pub capabilities: &'static [&'static str],
    pub examples: &'static [&'static str],
}

pub static KNOWN_SERVERS: &[ServerProfile] = &[
    ServerProfile {
        name: "postgres",
        description: "PostgreSQL database access and operations",
        capabilities: &[
            "Execute SQL queries (SELECT, INSERT, UPDATE, DELETE)",
            "Schema inspection (tables, columns, indexes)",
            "Database administration tasks",
            "Data analysis and reporting",
        ],
        examples: &[
            "mcp postgres \"list all tables\"",
            "mcp postgres \"show schema for users table\"",
        ],
    },
    ServerProfile {
        name: "sqlite",
        description: "SQLite local database file operations",
        capabilities: &[
            "Query local SQLite databases",
            "Table and schema inspection",
            "Data import/export operations",
        ],
        examples: &["mcp sqlite \"list tables\"", "mcp sqlite \"SELECT COUNT(*) FROM users\""],
    },
    ServerProfile {
        name: "mysql",
        description: "MySQL database connectivity and operations",
        capabilities: &[
            "Full MySQL query support",
            "Database and table management",
            "Performance monitoring",
        ],
        examples: &["mcp mysql \"SHOW DATABASES\"", "mcp mysql \"DESCRIBE users\""],
    },
    ServerProfile {
        name: "github",
        description: "GitHub repository and API management",
        capabilities: &[
            "Repository browsing and file access",
            "Issue and pull request management",
            "Commit history and branch operations",
            "GitHub Actions workflow management",
        ],
        examples: &[
            "mcp github \"list repositories\"",
            "mcp github \"show issues for repo/name\"",
        ],
    },
    ServerProfile {
        name: "gitlab",
        description: "GitLab project and CI/CD operations",
        capabilities: &[
            "Project and repository management",
            "Merge request operations",
            "CI/CD pipeline monitoring",
        ],
        examples: &["mcp gitlab \"list projects\"", "mcp gitlab \"show pipeline status\""],
    },
    ServerProfile {
        name: "jira",
        description: "JIRA project management and issue tracking",
        capabilities: &[
            "Issue creation, viewing, and management",
            "Project and sprint operations",
            "Workflow and transition management",
        ],
        examples: &["mcp jira \"list open issues\"", "mcp jira \"show sprint progress\""],
    },
    ServerProfile {
        name: "atlassian",
        description: "Full Atlassian suite (Confluence + JIRA)",
        capabilities: &[
            "All JIRA functionality",
            "Confluence page management",
            "Cross-tool integration and linking",
        ],
        examples: &["mcp atlassian \"search confluence pages\""],
    },
    ServerProfile {
        name: "filesystem",
        description: "Secure file system operations",
        capabilities: &[
            "File and directory browsing",
            "File content reading and writing",
            "File metadata and permissions",
        ],
        examples: &[
            "mcp filesystem \"list files in directory\"",
            "mcp filesystem \"read file content\"",
        ],
    },
    ServerProfile {
        name: "fetch",
        description: "Web content fetching and conversion",
        capabilities: &[
            "HTTP requests to web URLs",
            "HTML to markdown conversion",
            "Content extraction and parsing",
        ],
        examples: &["mcp fetch \"get content from https://example.com\""],
    },
    ServerProfile {
        name: "memory",
        description: "Persistent knowledge graph storage",
        capabilities: &[
            "Store and retrieve knowledge entities",
            "Relationship mapping and queries",
            "Persistent memory across sessions",
        ],
        examples: &["mcp memory \"recall information about project X\""],
    },
    ServerProfile {
        name: "docker",
        description: "Docker container management",
        capabilities: &[
            "Container lifecycle management",
            "Image building and deployment",
            "Container monitoring and logs",
        ],
        examples: &["mcp docker \"list running containers\"", "mcp docker \"show container logs\""],
    },
    ServerProfile {
        name: "kubernetes",
        description: "Kubernetes cluster operations",
        capabilities: &[
            "Pod and deployment management",
            "Service and ingress configuration",
            "Cluster monitoring and scaling",
        ],
        examples: &["mcp kubernetes \"list pods in namespace\""],
    },
    ServerProfile {
        name: "aws",
        description: "AWS S3 storage operations",
        capabilities: &[
            "S3 bucket and object management",
            "File upload and download",
            "Access control and permissions",
        ],
        examples: &["mcp aws \"list S3 buckets\""],
    },
    ServerProfile {
        name: "gcp",
        description: "Google Cloud Platform storage",
        capabilities: &[
            "Cloud Storage bucket operations",
            "Object lifecycle management",
            "Access control and IAM",
        ],
        examples: &["mcp gcp \"list storage buckets\""],
    },
];

/// Profile for a server name (case-insensitive).
pub fn profile(name: &str) -> Option<&'static ServerProfile> {
    let name = name.trim();
    KNOWN_SERVERS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

/// Capabilities of every configured server that has a known profile.
pub fn capability_summary(servers: &BTreeMap<String, String>) -> BTreeMap<String, &'static [&'static str]> {
    servers
        .keys()
        .filter_map(|name| profile(name).map(|p| (name.clone(), p.capabilities)))
        .collect()
}

/// Prompt section telling a model which MCP servers it can suggest.
pub fn context_prompt(servers: &BTreeMap<String, String>) -> String {
    if servers.is_empty() {
        return "No MCP servers are currently configured.".to_string();
    }

    let mut lines = vec![
        "AVAILABLE MCP SERVERS:".to_string(),
        String::new(),
    ];
    for (name, url) in servers {
        match profile(name) {
            Some(p) => {
                lines.push(format!("## {} - {}", name.to_uppercase(), p.description));
                lines.push(format!("URL: {url}"));
                lines.push("Capabilities:".to_string());
                lines.extend(p.capabilities.iter().map(|c| format!("  - {c}")));
                lines.push("Example usage:".to_string());
                lines.extend(p.examples.iter().map(|e| format!("  {e}")));
            }
            None => {
                lines.push(format!("## {}", name.to_uppercase()));
                lines.push(format!("URL: {url}"));
            }
        }
        lines.push(String::new());
    }
    lines.push("Use 'mcp <server_name> <request>' to talk to a configured server.".to_string());
    lines.push("Be careful with destructive database operations (UPDATE, DELETE, DROP).".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servers(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn profile_lookup_ignores_case() {
        assert_eq!(profile("Postgres").unwrap().name, "postgres");
        assert!(profile("bogus").is_none());
    }

    #[test]
    fn summary_skips_unknown_servers() {
        let summary = capability_summary(&servers(&[
            ("github", "http://localhost:7000"),
            ("custom_1", "http://localhost:7001"),
        ]));
        assert_eq!(summary.len(), 1);
        assert!(summary["github"].contains(&"Issue and pull request management"));
    }

    #[test]
    fn context_prompt_lists_configured_servers() {
        let prompt = context_prompt(&servers(&[
            ("postgres", "http://localhost:5000"),
            ("custom_1", "http://localhost:7001"),
        ]));
        assert!(prompt.contains("## POSTGRES - PostgreSQL database access and operations"));
        assert!(prompt.contains("URL: http://localhost:5000"));
        assert!(prompt.contains("  - Schema inspection (tables, columns, indexes)"));
        assert!(prompt.contains("## CUSTOM_1\nURL: http://localhost:7001"));
        assert!(!prompt.contains("GITHUB"));
    }

    #[test]
    fn context_prompt_without_servers() {
        assert_eq!(
            context_prompt(&BTreeMap::new()),
            "No MCP servers are currently configured."
        );
    }
}
