//! Fixed content catalog the scenario generator draws from.
//!
//! Each category has a handful of realistic bug patterns. A pattern carries
//! the ground-truth root cause, the keywords a correct diagnosis must mention,
//! the symptoms a user would report, and the shape of the fix.

use crate::scenario::{Category, Language};

pub struct BugPattern {
    pub title: &'static str,
    pub root_cause: &'static str,
    pub keywords: &'static [&'static str],
    pub symptoms: &'static [&'static str],
    pub fix: &'static str,
}

pub fn patterns(category: Category) -> &'static [BugPattern] {
    match category {
        Category::SyntaxErrors => SYNTAX_ERRORS,
        Category::LogicErrors => LOGIC_ERRORS,
        Category::ConcurrencyIssues => CONCURRENCY_ISSUES,
        Category::MemoryIssues => MEMORY_ISSUES,
        Category::ApiMisuse => API_MISUSE,
        Category::PerformanceBugs => PERFORMANCE_BUGS,
        Category::CrossCategory => CROSS_CATEGORY,
    }
}

const SYNTAX_ERRORS: &[BugPattern] = &[
    BugPattern {
        title: "Unbalanced bracket after generated config block",
        root_cause: "A code generator emits an unterminated bracket when the config block is empty",
        keywords: &["bracket", "generator", "empty"],
        symptoms: &["build fails with unexpected end of input", "only fails for projects without overrides"],
        fix: "Close the bracket unconditionally in the template",
    },
    BugPattern {
        title: "Reserved keyword used as field name",
        root_cause: "A renamed field collides with a reserved keyword of the target language",
        keywords: &["reserved", "keyword", "field"],
        symptoms: &["parser rejects the module after a rename", "error points at an unrelated line"],
        fix: "Rename the field and update the serializer mapping",
    },
    BugPattern {
        title: "Mixed indentation breaks nested block",
        root_cause: "Tabs and spaces are mixed inside a nested block merged from two branches",
        keywords: &["indentation", "tabs", "merge"],
        symptoms: &["inconsistent indentation error on import", "appeared right after a merge"],
        fix: "Normalise indentation to spaces and enable the formatter check",
    },
    BugPattern {
        title: "Template literal missing closing backtick",
        root_cause: "A multi-line string literal lost its closing delimiter during a refactor",
        keywords: &["string", "literal", "delimiter"],
        symptoms: &["unterminated string error", "every line after the literal is highlighted"],
        fix: "Restore the closing delimiter",
    },
    BugPattern {
        title: "Trailing comma rejected by strict JSON loader",
        root_cause: "A hand-edited JSON fixture contains a trailing comma the strict loader rejects",
        keywords: &["trailing", "comma", "json"],
        symptoms: &["fixture loading fails in CI only", "local runs use the lenient loader"],
        fix: "Remove the trailing comma and validate fixtures in pre-commit",
    },
];

const LOGIC_ERRORS: &[BugPattern] = &[
    BugPattern {
        title: "Off-by-one error in loop boundary",
        root_cause: "The loop uses an inclusive upper bound, reading one element past the last valid index",
        keywords: &["off-by-one", "loop", "boundary", "index"],
        symptoms: &["last batch item processed twice", "index error on exactly full pages"],
        fix: "Use an exclusive upper bound in the pagination loop",
    },
    BugPattern {
        title: "Inverted condition skips validation",
        root_cause: "A negated guard condition skips validation for valid input and runs it for invalid input",
        keywords: &["inverted", "condition", "validation"],
        symptoms: &["invalid records accepted", "valid records occasionally rejected"],
        fix: "Remove the extra negation from the guard",
    },
    BugPattern {
        title: "Rounding applied before currency conversion",
        root_cause: "Amounts are rounded before conversion instead of after, accumulating rounding error",
        keywords: &["rounding", "conversion", "order"],
        symptoms: &["totals off by a few cents", "only for non-default currencies"],
        fix: "Convert first and round once at the end",
    },
    BugPattern {
        title: "Timezone-naive date comparison",
        root_cause: "Local and UTC timestamps are compared directly, shifting expiry by the UTC offset",
        keywords: &["timezone", "utc", "comparison"],
        symptoms: &["sessions expire early for some users", "depends on server region"],
        fix: "Normalise both timestamps to UTC before comparing",
    },
    BugPattern {
        title: "Default argument shared between calls",
        root_cause: "A mutable default value is shared across calls so state leaks between requests",
        keywords: &["default", "shared", "mutable"],
        symptoms: &["filters from a previous request reappear", "restarting the worker clears it"],
        fix: "Create a fresh value per call",
    },
    BugPattern {
        title: "Integer division truncates percentage",
        root_cause: "Percentage is computed with integer division, truncating to zero below one hundred percent",
        keywords: &["integer", "division", "truncat"],
        symptoms: &["progress stays at zero until completion", "dashboard jumps to 100%"],
        fix: "Compute the ratio in floating point",
    },
];

const CONCURRENCY_ISSUES: &[BugPattern] = &[
    BugPattern {
        title: "Race between cache refresh and read",
        root_cause: "The cache is cleared before the refreshed value is written, so concurrent readers observe an empty entry",
        keywords: &["race", "cache", "refresh"],
        symptoms: &["intermittent missing values under load", "not reproducible single-threaded"],
        fix: "Swap the new value in atomically instead of clear-then-write",
    },
    BugPattern {
        title: "Lock ordering deadlock between account transfers",
        root_cause: "Two transfer paths acquire the account locks in opposite order and deadlock",
        keywords: &["deadlock", "lock", "order"],
        symptoms: &["requests hang forever", "thread dump shows two blocked workers"],
        fix: "Acquire locks in a global order by account id",
    },
    BugPattern {
        title: "Unsynchronized counter loses increments",
        root_cause: "A shared counter is incremented with a non-atomic read-modify-write",
        keywords: &["atomic", "counter", "increment"],
        symptoms: &["metrics undercount at high traffic", "totals differ between runs"],
        fix: "Use an atomic increment",
    },
    BugPattern {
        title: "Double-checked initialization without barrier",
        root_cause: "Lazy initialization publishes a partially constructed object without a memory barrier",
        keywords: &["initialization", "barrier", "publish"],
        symptoms: &["rare null field access on startup", "only on multi-core hosts"],
        fix: "Use a once-cell style initializer",
    },
    BugPattern {
        title: "Task cancellation leaves lock held",
        root_cause: "A cancelled task exits without releasing the distributed lock it acquired",
        keywords: &["cancellation", "lock", "release"],
        symptoms: &["jobs stall until the lock TTL expires", "started after adding timeouts"],
        fix: "Release the lock in a finally/drop guard",
    },
];

const MEMORY_ISSUES: &[BugPattern] = &[
    BugPattern {
        title: "Event listeners never unregistered",
        root_cause: "Listeners are registered on every reconnect and never removed, retaining closed sessions",
        keywords: &["listener", "leak", "unregister"],
        symptoms: &["heap grows with each reconnect", "old session objects in heap dump"],
        fix: "Unregister listeners on disconnect",
    },
    BugPattern {
        title: "Unbounded in-process cache",
        root_cause: "The memoization cache has no size bound or eviction policy",
        keywords: &["unbounded", "cache", "eviction"],
        symptoms: &["out-of-memory after days of uptime", "memory proportional to distinct keys"],
        fix: "Bound the cache with LRU eviction",
    },
    BugPattern {
        title: "Use after free of pooled buffer",
        root_cause: "A buffer is returned to the pool while a pending write still references it",
        keywords: &["buffer", "pool", "after free"],
        symptoms: &["corrupted payloads under load", "crash in the serializer"],
        fix: "Return the buffer only after the write completes",
    },
    BugPattern {
        title: "Large file read fully into memory",
        root_cause: "Uploads are read into a single in-memory buffer instead of streamed",
        keywords: &["stream", "buffer", "upload"],
        symptoms: &["worker killed on large uploads", "memory spikes per request"],
        fix: "Stream the upload in fixed-size chunks",
    },
    BugPattern {
        title: "Reference cycle keeps request graph alive",
        root_cause: "Parent and child objects hold strong references to each other, preventing collection",
        keywords: &["cycle", "reference", "weak"],
        symptoms: &["memory never returns to baseline", "gc logs show growing old generation"],
        fix: "Make the back-reference weak",
    },
];

const API_MISUSE: &[BugPattern] = &[
    BugPattern {
        title: "Client created per request",
        root_cause: "A new HTTP client with its own connection pool is created for every request",
        keywords: &["client", "connection", "pool"],
        symptoms: &["socket exhaustion", "latency spikes from TLS handshakes"],
        fix: "Share one client across requests",
    },
    BugPattern {
        title: "Pagination token ignored",
        root_cause: "The caller ignores the continuation token so only the first page of results is processed",
        keywords: &["pagination", "token", "page"],
        symptoms: &["exports truncated at 100 rows", "no error reported"],
        fix: "Loop until the continuation token is empty",
    },
    BugPattern {
        title: "Deprecated parameter silently ignored",
        root_cause: "A deprecated parameter is silently ignored by the new library version",
        keywords: &["deprecated", "parameter", "version"],
        symptoms: &["timeouts stopped applying after upgrade", "no warnings in logs"],
        fix: "Switch to the replacement parameter",
    },
    BugPattern {
        title: "Transaction not committed",
        root_cause: "Writes happen inside a transaction that is never committed and is rolled back on close",
        keywords: &["transaction", "commit", "rollback"],
        symptoms: &["saved records disappear", "works with autocommit enabled"],
        fix: "Commit the transaction explicitly",
    },
    BugPattern {
        title: "Response status not checked",
        root_cause: "The response body is parsed without checking the HTTP status code",
        keywords: &["status", "response", "error"],
        symptoms: &["parse errors on upstream outages", "misleading error messages"],
        fix: "Check the status before decoding the body",
    },
];

const PERFORMANCE_BUGS: &[BugPattern] = &[
    BugPattern {
        title: "N+1 queries in listing endpoint",
        root_cause: "Related rows are fetched one query per item instead of with a single join",
        keywords: &["n+1", "query", "join"],
        symptoms: &["listing latency grows linearly with page size", "database CPU high"],
        fix: "Prefetch related rows in one query",
    },
    BugPattern {
        title: "Regex recompiled in hot loop",
        root_cause: "A regular expression is compiled on every iteration of a hot loop",
        keywords: &["regex", "compile", "loop"],
        symptoms: &["CPU bound log parsing", "profile dominated by regex compilation"],
        fix: "Compile the pattern once",
    },
    BugPattern {
        title: "Quadratic string concatenation",
        root_cause: "A report is built by repeated string concatenation, copying the buffer each time",
        keywords: &["quadratic", "concatenation", "string"],
        symptoms: &["report generation takes minutes for large accounts", "fine for small ones"],
        fix: "Accumulate into a builder and join once",
    },
    BugPattern {
        title: "Missing index on lookup column",
        root_cause: "A frequently filtered column lacks an index, forcing full table scans",
        keywords: &["index", "scan", "column"],
        symptoms: &["query time grows with table size", "slow query log entries"],
        fix: "Add the index in a migration",
    },
];

const CROSS_CATEGORY: &[BugPattern] = &[
    BugPattern {
        title: "Retry storm after config reload",
        root_cause: "A config reload resets backoff state while a shared client retries without jitter",
        keywords: &["retry", "backoff", "config"],
        symptoms: &["traffic spikes after deploys", "upstream rate limiting"],
        fix: "Persist backoff state across reloads and add jitter",
    },
    BugPattern {
        title: "Serializer version skew corrupts cache",
        root_cause: "Two service versions write incompatible serialized formats into the same cache key",
        keywords: &["version", "serializ", "cache"],
        symptoms: &["decode errors during rolling deploy", "cleared by flushing the cache"],
        fix: "Version the cache key by schema",
    },
    BugPattern {
        title: "Connection leak on error path under load",
        root_cause: "An early return on the error path skips releasing the pooled connection",
        keywords: &["connection", "leak", "error path"],
        symptoms: &["pool exhaustion after upstream errors", "recovers after restart"],
        fix: "Release the connection with a guard on every path",
    },
    BugPattern {
        title: "Feature flag evaluated with stale context",
        root_cause: "Feature flags are evaluated once at startup with a stale tenant context",
        keywords: &["feature flag", "stale", "context"],
        symptoms: &["tenants see each other's features", "only after hot reload"],
        fix: "Evaluate flags per request",
    },
];

// ---------------------------------------------------------------------------
// Path vocabulary
// ---------------------------------------------------------------------------

pub const MODULES: &[&str] = &[
    "auth", "billing", "cache", "checkout", "config", "db", "events", "export", "gateway",
    "inventory", "jobs", "metrics", "notifications", "orders", "pagination", "payments",
    "reports", "scheduler", "search", "session", "storage", "sync", "users", "webhooks",
];

pub const COMPONENTS: &[&str] = &[
    "client", "handler", "service", "repository", "worker", "manager", "parser", "adapter",
    "controller", "validator", "pool", "router", "serializer", "store", "utils",
];

pub fn source_root(language: Language) -> &'static str {
    match language {
        Language::Python => "app",
        Language::Javascript => "src",
        Language::Java => "src/main/java/com/acme",
        Language::Go => "internal",
        Language::Rust => "src",
    }
}

pub fn test_root(language: Language) -> &'static str {
    match language {
        Language::Python => "tests",
        Language::Javascript => "test",
        Language::Java => "src/test/java/com/acme",
        Language::Go => "internal",
        Language::Rust => "tests",
    }
}

pub const CONFIG_FILES: &[&str] = &[
    "config/settings.yaml",
    "config/production.toml",
    "deploy/helm/values.yaml",
    ".env.example",
    "config/feature_flags.json",
];

pub const DOC_TOPICS: &[&str] = &[
    "architecture", "runbook", "api", "migration-guide", "incident", "adr", "onboarding",
];

pub const LOG_SOURCES: &[&str] = &["app", "worker", "gateway", "scheduler", "db"];

pub const AUTHORS: &[&str] = &[
    "a.nguyen", "b.okafor", "c.schmidt", "d.rossi", "e.tanaka", "f.haddad", "g.kowalski",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_category_has_patterns() {
        for category in Category::ALL {
            let p = patterns(category);
            assert!(p.len() >= 4, "{category} has too few patterns");
            for pattern in p {
                assert!(!pattern.keywords.is_empty());
                assert!(!pattern.symptoms.is_empty());
            }
        }
    }

    #[test]
    fn test_off_by_one_pattern_present() {
        assert!(patterns(Category::LogicErrors)
            .iter()
            .any(|p| p.title == "Off-by-one error in loop boundary"));
    }
}
