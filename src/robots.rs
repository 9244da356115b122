use std::collections::HashMap;

/// AI crawlers whose access to `/` is reported in the strategy details
pub const AI_CRAWLERS: &[&str] = &["GPTBot", "ClaudeBot", "PerplexityBot", "Google-Extended", "CCBot"];

/// Represents a robots.txt rule (either Allow or Disallow)
#[derive(Debug, Clone, PartialEq)]
struct Rule {
    pattern: String,
    is_allow: bool,
}

/// Parsed robots.txt for one host
#[derive(Debug, Default, Clone)]
pub struct RobotsTxt {
    /// Rules grouped by user-agent (lowercased)
    rules: HashMap<String, Vec<Rule>>,
    /// `Sitemap:` directives in file order
    sitemaps: Vec<String>,
}

impl RobotsTxt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses robots.txt content
    pub fn parse(content: &str) -> Self {
        let mut robots = Self::new();
        let mut current_agents: Vec<String> = Vec::new();
        let mut current_rules: Vec<Rule> = Vec::new();
        // Consecutive User-agent lines share one group
        let mut in_agent_block = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_lowercase();
            let value = value.trim();

            match field.as_str() {
                "user-agent" => {
                    if !in_agent_block {
                        robots.flush_group(&current_agents, &current_rules);
                        current_agents.clear();
                        current_rules.clear();
                    }
                    current_agents.push(value.to_lowercase());
                    in_agent_block = true;
                }
                "disallow" | "allow" => {
                    in_agent_block = false;
                    if !value.is_empty() {
                        current_rules.push(Rule {
                            pattern: value.to_string(),
                            is_allow: field == "allow",
                        });
                    }
                }
                "sitemap" => {
                    if !value.is_empty() && !robots.sitemaps.iter().any(|s| s == value) {
                        robots.sitemaps.push(value.to_string());
                    }
                }
                _ => {
                    in_agent_block = false;
                }
            }
        }

        robots.flush_group(&current_agents, &current_rules);
        robots
    }

    fn flush_group(&mut self, agents: &[String], rules: &[Rule]) {
        for agent in agents {
            self.rules.entry(agent.clone()).or_default().extend(rules.iter().cloned());
        }
    }

    /// Sitemap URLs declared in the file
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    /// Checks if a path is allowed for a user agent
    pub fn is_allowed(&self, path: &str, user_agent: &str) -> bool {
        if let Some(rules) = self.rules.get(&user_agent.to_lowercase()) {
            return check_rules(rules, path);
        }
        if let Some(rules) = self.rules.get("*") {
            return check_rules(rules, path);
        }
        true
    }

    /// Well-known AI crawlers that may not fetch `/`
    pub fn blocked_ai_crawlers(&self) -> Vec<String> {
        AI_CRAWLERS
            .iter()
            .filter(|agent| !self.is_allowed("/", agent))
            .map(|agent| agent.to_string())
            .collect()
    }
}

/// Longest matching pattern wins; ties go to the later rule
fn check_rules(rules: &[Rule], path: &str) -> bool {
    let mut allowed = true;
    let mut most_specific_length = 0;

    for rule in rules {
        if path_matches(&rule.pattern, path) {
            let pattern_len = rule.pattern.len();
            if pattern_len >= most_specific_length {
                most_specific_length = pattern_len;
                allowed = rule.is_allow;
            }
        }
    }

    allowed
}

/// Checks if a path matches a pattern (supports * and $ wildcards)
fn path_matches(pattern: &str, path: &str) -> bool {
    let (pattern, must_end) = match pattern.strip_suffix('$') {
        Some(stripped) => (stripped, true),
        None => (pattern, false),
    };

    if !pattern.contains('*') {
        return if must_end { path == pattern } else { path.starts_with(pattern) };
    }

    let pattern_chars: Vec<char> = pattern.chars().collect();
    let path_chars: Vec<char> = path.chars().collect();
    matches_from(&pattern_chars, &path_chars, must_end)
}

fn matches_from(pattern: &[char], path: &[char], must_end: bool) -> bool {
    match pattern.split_first() {
        None => !must_end || path.is_empty(),
        Some(('*', rest)) => (0..=path.len()).any(|i| matches_from(rest, &path[i..], must_end)),
        Some((c, rest)) => path.first() == Some(c) && matches_from(rest, &path[1..], must_end),
    }
}
