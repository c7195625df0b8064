//! Headless smoke check: create an instance and a device, print what was
//! selected. Run with `RUST_LOG=trace` to see the full enumeration.

use kiln_gpu::{DeviceType, Instance, InstanceDesc};

fn main() {
    env_logger::init();

    let instance = Instance::new(InstanceDesc { validation: true }).expect("create instance");
    let device = instance
        .create_device(
            &[
                DeviceType::DiscreteGpu,
                DeviceType::IntegratedGpu,
                DeviceType::VirtualGpu,
                DeviceType::Cpu,
            ],
            2,
        )
        .expect("create device");

    let properties = device.get_device_properties();
    println!("device: {}", properties.device_name);
    println!("  type: {:?}", properties.ty);
    println!(
        "  api version: {}.{}.{}",
        properties.api_version >> 22,
        (properties.api_version >> 12) & 0x3ff,
        properties.api_version & 0xfff
    );
    println!("  unified memory: {}", properties.has_unified_memory);
    println!(
        "  uniform/storage offset alignment: {}/{}",
        properties.uniform_buffer_offset_alignment, properties.storage_buffer_offset_alignment
    );
    println!(
        "  compute workgroups: count {:?}, size {:?}",
        properties.max_compute_work_group_count, properties.max_compute_work_group_size
    );
}
