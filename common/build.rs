fn main() -> Result<(), Box<dyn std::error::Error>> {
    let protos = [
        "proto/v2ray/core/common/serial/typed_message.proto",
        "proto/v2ray/core/common/protocol/user.proto",
        "proto/v2ray/core/proxy/vmess/account.proto",
        "proto/v2ray/core/app/proxyman/command/command.proto",
        "proto/v2ray/core/app/stats/command/command.proto",
    ];

    for proto in &protos {
        println!("cargo:rerun-if-changed={}", proto);
    }

    tonic_build::configure().compile_protos(&protos, &["proto"])?;
    Ok(())
}
