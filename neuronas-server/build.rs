fn main() {
    built::write_built_file().expect("Failed to acquire build-time information");

    // Pass through NEURONAS_GIT_HASH from packaged builds without a .git directory
    println!("cargo:rerun-if-env-changed=NEURONAS_GIT_HASH");
    if let Ok(hash) = std::env::var("NEURONAS_GIT_HASH") {
        println!("cargo:rustc-env=NEURONAS_GIT_HASH={}", hash);
    }
}
