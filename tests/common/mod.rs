//! Shared fixtures: on-disk Java repos in the shape of a small
//! Spring Cloud / Dubbo microservice estate, plus git helpers.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

/// Run git in `dir`, panicking with stderr on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_CONFIG_GLOBAL", "/dev/null")
        .env("GIT_CONFIG_SYSTEM", "/dev/null")
        .output()
        .expect("failed to spawn git");
    assert!(
        output.status.success(),
        "git {:?} failed in {}: {}",
        args,
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Initialize a repo on branch `master` with everything committed.
pub fn init_repo(dir: &Path) -> String {
    git(dir, &["init", "--initial-branch=master"]);
    commit_all(dir, "initial commit")
}

/// Stage and commit everything; returns the new HEAD hash.
pub fn commit_all(dir: &Path, message: &str) -> String {
    git(dir, &["add", "-A"]);
    git(
        dir,
        &[
            "-c",
            "user.name=fixture",
            "-c",
            "user.email=fixture@example.com",
            "commit",
            "--allow-empty",
            "-m",
            message,
        ],
    );
    git(dir, &["rev-parse", "HEAD"])
}

pub fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Feign client interface living in the main repo (`pay-api`).
pub const POINT_CLIENT: &str = r#"package com.cloudE.pay.client;

import org.springframework.cloud.openfeign.FeignClient;
import org.springframework.web.bind.annotation.GetMapping;
import org.springframework.web.bind.annotation.PostMapping;

@FeignClient(name = "pay-provider", path = "/points")
public interface PointClient {

    @GetMapping("/balance")
    Long getBalance(Long userId);

    @PostMapping("/batch-update")
    String batchUpdatePoints(Long userId, int delta);
}
"#;

/// Consumer in the related repo (`ucenter-provider`): one injection,
/// three call sites.
pub const POINT_MANAGER: &str = r#"package com.cloudE.ucenter.manager;

import com.cloudE.pay.client.PointClient;
import org.springframework.stereotype.Component;

import javax.annotation.Resource;

@Component
public class PointManager {

    @Resource
    private PointClient pointClient;

    public void rewardSignIn(Long userId) {
        pointClient.batchUpdatePoints(userId, 10);
    }

    public void rewardPurchase(Long userId, int amount) {
        pointClient.batchUpdatePoints(userId, amount);
    }

    public void revokePoints(Long userId, int amount) {
        pointClient.batchUpdatePoints(userId, -amount);
    }
}
"#;

/// RestTemplate caller of the Feign route, also in `ucenter-provider`.
pub const ORDER_NOTIFIER: &str = r#"package com.cloudE.ucenter.task;

import org.springframework.web.client.RestTemplate;

public class OrderNotifier {

    private final RestTemplate restTemplate = new RestTemplate();

    public void notifyBatchUpdate(Long userId) {
        restTemplate.postForObject("http://pay-provider/points/batch-update", userId, String.class);
    }
}
"#;

/// Dubbo service interface in the main repo (`user-service`).
pub const USER_SERVICE: &str = r#"package com.example.service;

public interface UserService {

    String getUserById(Long id);
}
"#;

/// Dubbo implementation in the main repo.
pub const USER_SERVICE_IMPL: &str = r#"package com.example.service.impl;

import com.example.service.UserService;
import org.apache.dubbo.config.annotation.DubboService;

@DubboService
public class UserServiceImpl implements UserService {

    public String getUserById(Long id) {
        return "user-" + id;
    }
}
"#;

/// Dubbo consumer in the related repo (`order-service`).
pub const ORDER_MANAGER: &str = r#"package com.example.order;

import com.example.service.UserService;
import org.apache.dubbo.config.annotation.DubboReference;

public class OrderManager {

    @DubboReference
    private UserService remoteService;

    public String describeOwner(Long id) {
        return remoteService.getUserById(id);
    }
}
"#;

/// Lay out the Feign fixture pair under `base`, without git.
/// Returns (main_root, related_root).
pub fn feign_fixture(base: &Path) -> (PathBuf, PathBuf) {
    let main = base.join("pay-api");
    let related = base.join("ucenter-provider");
    write_file(
        &main,
        "src/main/java/com/cloudE/pay/client/PointClient.java",
        POINT_CLIENT,
    );
    write_file(
        &related,
        "src/main/java/com/cloudE/ucenter/manager/PointManager.java",
        POINT_MANAGER,
    );
    write_file(
        &related,
        "src/main/java/com/cloudE/ucenter/task/OrderNotifier.java",
        ORDER_NOTIFIER,
    );
    (main, related)
}

/// Lay out the Dubbo fixture pair under `base`, without git.
/// Returns (main_root, related_root).
pub fn dubbo_fixture(base: &Path) -> (PathBuf, PathBuf) {
    let main = base.join("user-service");
    let related = base.join("order-service");
    write_file(
        &main,
        "src/main/java/com/example/service/UserService.java",
        USER_SERVICE,
    );
    write_file(
        &main,
        "src/main/java/com/example/service/impl/UserServiceImpl.java",
        USER_SERVICE_IMPL,
    );
    write_file(
        &related,
        "src/main/java/com/example/order/OrderManager.java",
        ORDER_MANAGER,
    );
    (main, related)
}

/// Line number (1-based) of the first line containing `needle`.
pub fn line_of(root: &Path, rel: &str, needle: &str) -> usize {
    let content = std::fs::read_to_string(root.join(rel)).unwrap();
    content
        .lines()
        .position(|l| l.contains(needle))
        .map(|i| i + 1)
        .unwrap_or_else(|| panic!("needle {needle:?} not found in {rel}"))
}
