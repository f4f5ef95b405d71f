fn main() {
    println!("cargo:rerun-if-changed=cuda/partition_sim.cu");

    // Only compile CUDA if the cuda feature is enabled AND nvcc is available
    if std::env::var_os("CARGO_FEATURE_CUDA").is_none() {
        return;
    }
    if std::process::Command::new("nvcc")
        .arg("--version")
        .output()
        .is_err()
    {
        println!("cargo:warning=nvcc not found, skipping CUDA kernel compilation");
        return;
    }

    let out_dir = std::env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    let arch = std::env::var("CUDA_ARCH").unwrap_or_else(|_| "sm_89".to_string());
    println!("cargo:rerun-if-env-changed=CUDA_ARCH");
    println!("cargo:warning=Compiling partition simulation kernel for {}", arch);

    let status = std::process::Command::new("nvcc")
        .arg("-ptx")
        .arg("-O3")
        .arg(format!("-arch={}", arch))
        .arg("cuda/partition_sim.cu")
        .arg("-o")
        .arg(format!("{}/partition_sim.ptx", out_dir))
        .status()
        .expect("failed to invoke nvcc");

    if !status.success() {
        panic!("Failed to compile partition_sim.cu to PTX");
    }
}
