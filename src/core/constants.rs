/// String constants shared across the indexer and tracers.
///
/// Annotation names and directory filters are matched in many places;
/// keeping them here avoids drift between the indexer and the tracer.

/// Spring MVC / REST annotations recognized by the route extractor
pub mod mappings {
    pub const REQUEST_MAPPING: &str = "RequestMapping";
    pub const GET_MAPPING: &str = "GetMapping";
    pub const POST_MAPPING: &str = "PostMapping";
    pub const PUT_MAPPING: &str = "PutMapping";
    pub const DELETE_MAPPING: &str = "DeleteMapping";
    pub const PATCH_MAPPING: &str = "PatchMapping";

    pub const ALL: &[&str] = &[
        REQUEST_MAPPING,
        GET_MAPPING,
        POST_MAPPING,
        PUT_MAPPING,
        DELETE_MAPPING,
        PATCH_MAPPING,
    ];

    /// HTTP verb implied by a mapping annotation name.
    /// `@RequestMapping` without `method=` stays generic.
    pub fn http_verb(annotation: &str) -> &'static str {
        match annotation {
            GET_MAPPING => "GET",
            POST_MAPPING => "POST",
            PUT_MAPPING => "PUT",
            DELETE_MAPPING => "DELETE",
            PATCH_MAPPING => "PATCH",
            _ => "REQUEST",
        }
    }
}

/// Stereotype and injection annotations
pub mod stereotypes {
    pub const REST_CONTROLLER: &str = "RestController";
    pub const CONTROLLER: &str = "Controller";
    pub const FEIGN_CLIENT: &str = "FeignClient";
    pub const DUBBO_SERVICE: &str = "DubboService";
    pub const SERVICE: &str = "Service";

    pub const DUBBO_REFERENCE: &str = "DubboReference";
    pub const REFERENCE: &str = "Reference";
    pub const AUTOWIRED: &str = "Autowired";
    pub const RESOURCE: &str = "Resource";

    /// Injection annotations that mark the following field declaration
    pub const INJECTIONS: &[&str] = &[DUBBO_REFERENCE, REFERENCE, AUTOWIRED, RESOURCE];

    /// True when the annotation marks a Dubbo RPC consumer field
    pub fn is_dubbo_injection(annotation: &str) -> bool {
        annotation == DUBBO_REFERENCE || annotation == REFERENCE
    }
}

/// Directory names never descended into during a repository scan
pub const SKIPPED_DIRS: &[&str] = &[
    "target",
    "build",
    "out",
    "node_modules",
    ".git",
    ".idea",
    ".mvn",
    "generated-sources",
];

/// Path segments that mark test sources (skipped by default)
pub const TEST_DIR_MARKERS: &[&str] = &["src/test", "src\\test"];

/// Pathspec patterns the diff is restricted to
pub const DIFF_PATHSPEC: &[&str] = &[
    "*.java",
    "*.xml",
    "*.yml",
    "*.yaml",
    "*.properties",
    "*.sql",
];

/// Injection kinds recorded in the RPC map
pub mod injection_kinds {
    pub const DUBBO: &str = "dubbo";
    pub const SPRING_DI: &str = "spring_di";
}

/// Defaults mirrored by `AnalysisConfig`
pub mod defaults {
    pub const PARALLEL_CLONE_LIMIT: usize = 8;
    pub const GIT_OP_TIMEOUT_SECONDS: u64 = 120;
    pub const CONTEXT_LINES: usize = 2;
    pub const DEFAULT_BRANCH: &str = "master";
    pub const FALLBACK_BRANCHES: &[&str] = &["master", "main"];
    pub const LLM_TIMEOUT_SECONDS: u64 = 120;
}
